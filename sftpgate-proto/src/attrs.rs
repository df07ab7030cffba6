//! The v3 file-attribute record.

use bytes::{BufMut, Bytes, BytesMut};

use crate::consts::*;
use crate::{wire, ProtocolError};

/// File attributes with a leading flag word selecting which fields follow.
///
/// On the wire only the fields whose bit is set in `flags` are present, in
/// a fixed order: size, (uid, gid), permissions, (atime, mtime), extended
/// pair count + pairs. Absent fields decode to their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttrs {
    pub flags: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: u32,
    pub mtime: u32,
    pub extended: Vec<(String, String)>,
}

impl FileAttrs {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.flags);
        if self.flags & ATTR_SIZE != 0 {
            buf.put_u64(self.size);
        }
        if self.flags & ATTR_UIDGID != 0 {
            buf.put_u32(self.uid);
            buf.put_u32(self.gid);
        }
        if self.flags & ATTR_PERMISSIONS != 0 {
            buf.put_u32(self.mode);
        }
        if self.flags & ATTR_ACMODTIME != 0 {
            buf.put_u32(self.atime);
            buf.put_u32(self.mtime);
        }
        if self.flags & ATTR_EXTENDED != 0 {
            buf.put_u32(self.extended.len() as u32);
            for (name, value) in &self.extended {
                wire::put_string(buf, name);
                wire::put_string(buf, value);
            }
        }
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut attrs = FileAttrs {
            flags: wire::get_u32(buf)?,
            ..Default::default()
        };
        if attrs.flags & ATTR_SIZE != 0 {
            attrs.size = wire::get_u64(buf)?;
        }
        if attrs.flags & ATTR_UIDGID != 0 {
            attrs.uid = wire::get_u32(buf)?;
            attrs.gid = wire::get_u32(buf)?;
        }
        if attrs.flags & ATTR_PERMISSIONS != 0 {
            attrs.mode = wire::get_u32(buf)?;
        }
        if attrs.flags & ATTR_ACMODTIME != 0 {
            attrs.atime = wire::get_u32(buf)?;
            attrs.mtime = wire::get_u32(buf)?;
        }
        if attrs.flags & ATTR_EXTENDED != 0 {
            let count = wire::get_u32(buf)?;
            for _ in 0..count {
                let name = wire::get_string(buf)?;
                let value = wire::get_string(buf)?;
                attrs.extended.push((name, value));
            }
        }
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Buf;

    use super::*;

    fn round_trip(attrs: &FileAttrs) -> FileAttrs {
        let mut buf = BytesMut::new();
        attrs.encode(&mut buf);
        let mut bytes = buf.freeze();
        let decoded = FileAttrs::decode(&mut bytes).unwrap();
        assert_eq!(bytes.remaining(), 0);
        decoded
    }

    #[test]
    fn empty_attrs() {
        let attrs = FileAttrs::default();
        assert_eq!(round_trip(&attrs), attrs);
    }

    #[test]
    fn all_flag_subsets_round_trip() {
        for flags in 0..16u32 {
            let attrs = FileAttrs {
                flags,
                size: 0x1234_5678_9abc_def0,
                uid: 1000,
                gid: 100,
                mode: 0o100644,
                atime: 1_577_934_245,
                mtime: 1_577_934_245,
                extended: vec![],
            };
            let decoded = round_trip(&attrs);
            assert_eq!(decoded.flags, flags);
            assert_eq!(decoded.size, if flags & ATTR_SIZE != 0 { attrs.size } else { 0 });
            assert_eq!(decoded.mode, if flags & ATTR_PERMISSIONS != 0 { attrs.mode } else { 0 });
            assert_eq!(
                decoded.mtime,
                if flags & ATTR_ACMODTIME != 0 { attrs.mtime } else { 0 }
            );
            assert_eq!(decoded.uid, if flags & ATTR_UIDGID != 0 { attrs.uid } else { 0 });
        }
    }

    #[test]
    fn extended_pairs() {
        let attrs = FileAttrs {
            flags: ATTR_EXTENDED,
            extended: vec![("acl".into(), "user::rwx".into())],
            ..Default::default()
        };
        assert_eq!(round_trip(&attrs), attrs);
    }

    #[test]
    fn truncated_attrs_error() {
        let attrs = FileAttrs {
            flags: ATTR_SIZE | ATTR_ACMODTIME,
            size: 42,
            atime: 1,
            mtime: 2,
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        attrs.encode(&mut buf);
        let mut truncated = buf.freeze().slice(..8);
        assert!(matches!(
            FileAttrs::decode(&mut truncated),
            Err(ProtocolError::ShortPacket)
        ));
    }
}
