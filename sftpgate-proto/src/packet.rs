//! The v3 packet set: tagged sum, body marshalling and framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::consts::*;
use crate::{wire, FileAttrs, ProtocolError, MAX_PACKET_SIZE};

/// Error payload of an `FXP_STATUS` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusError {
    pub code: u32,
    pub msg: String,
    pub lang: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self.msg, status_code_name(self.code))
    }
}

impl std::error::Error for StatusError {}

/// One entry of an `FXP_NAME` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameEntry {
    pub name: String,
    pub long_name: String,
    pub attrs: FileAttrs,
}

/// A decoded SFTP v3 packet.
///
/// The dispatcher's match over this enum is the single place that knows
/// every packet shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Init {
        version: u32,
        extensions: Vec<(String, String)>,
    },
    Version {
        version: u32,
        extensions: Vec<(String, String)>,
    },
    Open {
        id: u32,
        path: String,
        pflags: u32,
        attrs: FileAttrs,
    },
    Close {
        id: u32,
        handle: String,
    },
    Read {
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    },
    Write {
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    },
    Lstat {
        id: u32,
        path: String,
    },
    Fstat {
        id: u32,
        handle: String,
    },
    SetStat {
        id: u32,
        path: String,
        attrs: FileAttrs,
    },
    FSetStat {
        id: u32,
        handle: String,
        attrs: FileAttrs,
    },
    OpenDir {
        id: u32,
        path: String,
    },
    ReadDir {
        id: u32,
        handle: String,
    },
    Remove {
        id: u32,
        filename: String,
    },
    MkDir {
        id: u32,
        path: String,
        attrs: FileAttrs,
    },
    RmDir {
        id: u32,
        path: String,
    },
    RealPath {
        id: u32,
        path: String,
    },
    Stat {
        id: u32,
        path: String,
    },
    Rename {
        id: u32,
        oldpath: String,
        newpath: String,
    },
    ReadLink {
        id: u32,
        path: String,
    },
    Symlink {
        id: u32,
        target: String,
        link: String,
    },
    Status {
        id: u32,
        status: StatusError,
    },
    Handle {
        id: u32,
        handle: String,
    },
    Data {
        id: u32,
        data: Vec<u8>,
    },
    Name {
        id: u32,
        entries: Vec<NameEntry>,
    },
    Attrs {
        id: u32,
        attrs: FileAttrs,
    },
}

impl Packet {
    pub fn type_byte(&self) -> u8 {
        match self {
            Packet::Init { .. } => FXP_INIT,
            Packet::Version { .. } => FXP_VERSION,
            Packet::Open { .. } => FXP_OPEN,
            Packet::Close { .. } => FXP_CLOSE,
            Packet::Read { .. } => FXP_READ,
            Packet::Write { .. } => FXP_WRITE,
            Packet::Lstat { .. } => FXP_LSTAT,
            Packet::Fstat { .. } => FXP_FSTAT,
            Packet::SetStat { .. } => FXP_SETSTAT,
            Packet::FSetStat { .. } => FXP_FSETSTAT,
            Packet::OpenDir { .. } => FXP_OPENDIR,
            Packet::ReadDir { .. } => FXP_READDIR,
            Packet::Remove { .. } => FXP_REMOVE,
            Packet::MkDir { .. } => FXP_MKDIR,
            Packet::RmDir { .. } => FXP_RMDIR,
            Packet::RealPath { .. } => FXP_REALPATH,
            Packet::Stat { .. } => FXP_STAT,
            Packet::Rename { .. } => FXP_RENAME,
            Packet::ReadLink { .. } => FXP_READLINK,
            Packet::Symlink { .. } => FXP_SYMLINK,
            Packet::Status { .. } => FXP_STATUS,
            Packet::Handle { .. } => FXP_HANDLE,
            Packet::Data { .. } => FXP_DATA,
            Packet::Name { .. } => FXP_NAME,
            Packet::Attrs { .. } => FXP_ATTRS,
        }
    }

    pub fn type_name(&self) -> &'static str {
        packet_type_name(self.type_byte())
    }

    /// The request id, for every kind that carries one.
    pub fn request_id(&self) -> Option<u32> {
        match self {
            Packet::Init { .. } | Packet::Version { .. } => None,
            Packet::Open { id, .. }
            | Packet::Close { id, .. }
            | Packet::Read { id, .. }
            | Packet::Write { id, .. }
            | Packet::Lstat { id, .. }
            | Packet::Fstat { id, .. }
            | Packet::SetStat { id, .. }
            | Packet::FSetStat { id, .. }
            | Packet::OpenDir { id, .. }
            | Packet::ReadDir { id, .. }
            | Packet::Remove { id, .. }
            | Packet::MkDir { id, .. }
            | Packet::RmDir { id, .. }
            | Packet::RealPath { id, .. }
            | Packet::Stat { id, .. }
            | Packet::Rename { id, .. }
            | Packet::ReadLink { id, .. }
            | Packet::Symlink { id, .. }
            | Packet::Status { id, .. }
            | Packet::Handle { id, .. }
            | Packet::Data { id, .. }
            | Packet::Name { id, .. }
            | Packet::Attrs { id, .. } => Some(*id),
        }
    }

    /// Decode a packet body. The buffer starts at the type tag and spans
    /// exactly the frame body.
    pub fn decode(buf: &mut Bytes) -> Result<Packet, ProtocolError> {
        let tag = wire::get_u8(buf)?;
        match tag {
            FXP_INIT => {
                let version = wire::get_u32(buf)?;
                Ok(Packet::Init {
                    version,
                    extensions: decode_extensions(buf)?,
                })
            }
            FXP_VERSION => {
                let version = wire::get_u32(buf)?;
                Ok(Packet::Version {
                    version,
                    extensions: decode_extensions(buf)?,
                })
            }
            FXP_OPEN => Ok(Packet::Open {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
                pflags: wire::get_u32(buf)?,
                attrs: FileAttrs::decode(buf)?,
            }),
            FXP_CLOSE => Ok(Packet::Close {
                id: wire::get_u32(buf)?,
                handle: wire::get_string(buf)?,
            }),
            FXP_READ => Ok(Packet::Read {
                id: wire::get_u32(buf)?,
                handle: wire::get_string(buf)?,
                offset: wire::get_u64(buf)?,
                len: wire::get_u32(buf)?,
            }),
            FXP_WRITE => {
                let id = wire::get_u32(buf)?;
                let handle = wire::get_string(buf)?;
                let offset = wire::get_u64(buf)?;
                let len = wire::get_u32(buf)? as usize;
                if buf.remaining() < len {
                    return Err(ProtocolError::ShortPacket);
                }
                Ok(Packet::Write {
                    id,
                    handle,
                    offset,
                    data: buf.copy_to_bytes(len).to_vec(),
                })
            }
            FXP_LSTAT => Ok(Packet::Lstat {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
            }),
            FXP_FSTAT => Ok(Packet::Fstat {
                id: wire::get_u32(buf)?,
                handle: wire::get_string(buf)?,
            }),
            FXP_SETSTAT => Ok(Packet::SetStat {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
                attrs: FileAttrs::decode(buf)?,
            }),
            FXP_FSETSTAT => Ok(Packet::FSetStat {
                id: wire::get_u32(buf)?,
                handle: wire::get_string(buf)?,
                attrs: FileAttrs::decode(buf)?,
            }),
            FXP_OPENDIR => Ok(Packet::OpenDir {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
            }),
            FXP_READDIR => Ok(Packet::ReadDir {
                id: wire::get_u32(buf)?,
                handle: wire::get_string(buf)?,
            }),
            FXP_REMOVE => Ok(Packet::Remove {
                id: wire::get_u32(buf)?,
                filename: wire::get_string(buf)?,
            }),
            FXP_MKDIR => Ok(Packet::MkDir {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
                attrs: FileAttrs::decode(buf)?,
            }),
            FXP_RMDIR => Ok(Packet::RmDir {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
            }),
            FXP_REALPATH => Ok(Packet::RealPath {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
            }),
            FXP_STAT => Ok(Packet::Stat {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
            }),
            FXP_RENAME => Ok(Packet::Rename {
                id: wire::get_u32(buf)?,
                oldpath: wire::get_string(buf)?,
                newpath: wire::get_string(buf)?,
            }),
            FXP_READLINK => Ok(Packet::ReadLink {
                id: wire::get_u32(buf)?,
                path: wire::get_string(buf)?,
            }),
            FXP_SYMLINK => Ok(Packet::Symlink {
                id: wire::get_u32(buf)?,
                target: wire::get_string(buf)?,
                link: wire::get_string(buf)?,
            }),
            FXP_STATUS => Ok(Packet::Status {
                id: wire::get_u32(buf)?,
                status: StatusError {
                    code: wire::get_u32(buf)?,
                    msg: wire::get_string(buf)?,
                    lang: wire::get_string(buf)?,
                },
            }),
            FXP_HANDLE => Ok(Packet::Handle {
                id: wire::get_u32(buf)?,
                handle: wire::get_string(buf)?,
            }),
            FXP_DATA => Ok(Packet::Data {
                id: wire::get_u32(buf)?,
                data: wire::get_bytes(buf)?,
            }),
            FXP_NAME => {
                let id = wire::get_u32(buf)?;
                let count = wire::get_u32(buf)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(NameEntry {
                        name: wire::get_string(buf)?,
                        long_name: wire::get_string(buf)?,
                        attrs: FileAttrs::decode(buf)?,
                    });
                }
                Ok(Packet::Name { id, entries })
            }
            FXP_ATTRS => Ok(Packet::Attrs {
                id: wire::get_u32(buf)?,
                attrs: FileAttrs::decode(buf)?,
            }),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    /// Encode the packet body (type tag included, frame length excluded).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(self.type_byte());
        match self {
            Packet::Init {
                version,
                extensions,
            }
            | Packet::Version {
                version,
                extensions,
            } => {
                buf.put_u32(*version);
                for (name, value) in extensions {
                    wire::put_string(&mut buf, name);
                    wire::put_string(&mut buf, value);
                }
            }
            Packet::Open {
                id,
                path,
                pflags,
                attrs,
            } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, path);
                buf.put_u32(*pflags);
                attrs.encode(&mut buf);
            }
            Packet::Close { id, handle }
            | Packet::Fstat { id, handle }
            | Packet::ReadDir { id, handle }
            | Packet::Handle { id, handle } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, handle);
            }
            Packet::Read {
                id,
                handle,
                offset,
                len,
            } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, handle);
                buf.put_u64(*offset);
                buf.put_u32(*len);
            }
            Packet::Write {
                id,
                handle,
                offset,
                data,
            } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, handle);
                buf.put_u64(*offset);
                wire::put_bytes(&mut buf, data);
            }
            Packet::Lstat { id, path }
            | Packet::OpenDir { id, path }
            | Packet::RmDir { id, path }
            | Packet::RealPath { id, path }
            | Packet::Stat { id, path }
            | Packet::ReadLink { id, path } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, path);
            }
            Packet::Remove { id, filename } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, filename);
            }
            Packet::SetStat { id, path, attrs } | Packet::MkDir { id, path, attrs } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, path);
                attrs.encode(&mut buf);
            }
            Packet::FSetStat { id, handle, attrs } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, handle);
                attrs.encode(&mut buf);
            }
            Packet::Rename {
                id,
                oldpath,
                newpath,
            } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, oldpath);
                wire::put_string(&mut buf, newpath);
            }
            Packet::Symlink { id, target, link } => {
                buf.put_u32(*id);
                wire::put_string(&mut buf, target);
                wire::put_string(&mut buf, link);
            }
            Packet::Status { id, status } => {
                buf.put_u32(*id);
                buf.put_u32(status.code);
                wire::put_string(&mut buf, &status.msg);
                wire::put_string(&mut buf, &status.lang);
            }
            Packet::Data { id, data } => {
                buf.put_u32(*id);
                wire::put_bytes(&mut buf, data);
            }
            Packet::Name { id, entries } => {
                buf.put_u32(*id);
                buf.put_u32(entries.len() as u32);
                for entry in entries {
                    wire::put_string(&mut buf, &entry.name);
                    wire::put_string(&mut buf, &entry.long_name);
                    entry.attrs.encode(&mut buf);
                }
            }
            Packet::Attrs { id, attrs } => {
                buf.put_u32(*id);
                attrs.encode(&mut buf);
            }
        }
        buf.freeze()
    }

    /// Shorthand for an `FXP_STATUS` packet.
    pub fn status(id: u32, code: u32, msg: impl Into<String>) -> Packet {
        Packet::Status {
            id,
            status: StatusError {
                code,
                msg: msg.into(),
                lang: String::new(),
            },
        }
    }
}

fn decode_extensions(buf: &mut Bytes) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut extensions = Vec::new();
    while buf.remaining() > 0 {
        let name = wire::get_string(buf)?;
        let value = wire::get_string(buf)?;
        extensions.push((name, value));
    }
    Ok(extensions)
}

/// Read one framed packet from the stream.
///
/// Frames with a body shorter than 2 bytes or longer than
/// [`MAX_PACKET_SIZE`] are protocol errors that terminate the session.
pub async fn read_packet<R>(r: &mut R) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = r.read_u32().await?;
    if len > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLarge(len));
    }
    if len < 2 {
        return Err(ProtocolError::PacketTooSmall(len));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body).await?;
    let mut bytes = Bytes::from(body);
    Packet::decode(&mut bytes)
}

/// Write one framed packet to the stream and flush it.
pub async fn write_packet<W>(w: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let body = packet.encode();
    w.write_u32(body.len() as u32).await?;
    w.write_all(&body).await?;
    w.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let body = packet.encode();
        let mut bytes = body.clone();
        let decoded = Packet::decode(&mut bytes).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(bytes.remaining(), 0);
        // re-encoding is byte-identical
        assert_eq!(decoded.encode(), body);
    }

    #[test]
    fn round_trip_requests() {
        round_trip(Packet::Init {
            version: 3,
            extensions: vec![("posix-rename@openssh.com".into(), "1".into())],
        });
        round_trip(Packet::Open {
            id: 1,
            path: "/tmp/test.txt".into(),
            pflags: FXF_WRITE | FXF_CREAT,
            attrs: FileAttrs {
                flags: ATTR_PERMISSIONS,
                mode: 0o644,
                ..Default::default()
            },
        });
        round_trip(Packet::Close {
            id: 2,
            handle: "0".into(),
        });
        round_trip(Packet::Read {
            id: 3,
            handle: "0".into(),
            offset: 1 << 33,
            len: 4096,
        });
        round_trip(Packet::Write {
            id: 4,
            handle: "0".into(),
            offset: 8192,
            data: b"hello world".to_vec(),
        });
        round_trip(Packet::Lstat {
            id: 5,
            path: "/a".into(),
        });
        round_trip(Packet::Fstat {
            id: 6,
            handle: "1".into(),
        });
        round_trip(Packet::SetStat {
            id: 7,
            path: "/a".into(),
            attrs: FileAttrs {
                flags: ATTR_PERMISSIONS,
                mode: 0o755,
                ..Default::default()
            },
        });
        round_trip(Packet::FSetStat {
            id: 8,
            handle: "1".into(),
            attrs: FileAttrs::default(),
        });
        round_trip(Packet::OpenDir {
            id: 9,
            path: "/dir".into(),
        });
        round_trip(Packet::ReadDir {
            id: 10,
            handle: "2".into(),
        });
        round_trip(Packet::Remove {
            id: 11,
            filename: "/a".into(),
        });
        round_trip(Packet::MkDir {
            id: 12,
            path: "/dir".into(),
            attrs: FileAttrs::default(),
        });
        round_trip(Packet::RmDir {
            id: 13,
            path: "/dir".into(),
        });
        round_trip(Packet::RealPath {
            id: 14,
            path: "a/../b".into(),
        });
        round_trip(Packet::Stat {
            id: 15,
            path: "/a".into(),
        });
        round_trip(Packet::Rename {
            id: 16,
            oldpath: "/a".into(),
            newpath: "/b".into(),
        });
        round_trip(Packet::ReadLink {
            id: 17,
            path: "/l".into(),
        });
        round_trip(Packet::Symlink {
            id: 18,
            target: "/t".into(),
            link: "/l".into(),
        });
    }

    #[test]
    fn round_trip_responses() {
        round_trip(Packet::Version {
            version: 3,
            extensions: vec![],
        });
        round_trip(Packet::status(1, FX_OK, ""));
        round_trip(Packet::status(2, FX_NO_SUCH_FILE, "file does not exist"));
        round_trip(Packet::Handle {
            id: 3,
            handle: "17".into(),
        });
        round_trip(Packet::Data {
            id: 4,
            data: b"Hello".to_vec(),
        });
        round_trip(Packet::Name {
            id: 5,
            entries: vec![NameEntry {
                name: "a.txt".into(),
                long_name: "-rw-r--r--    1 user     user           11 Jan  2 03:04 a.txt".into(),
                attrs: FileAttrs {
                    flags: ATTR_SIZE | ATTR_PERMISSIONS | ATTR_ACMODTIME,
                    size: 11,
                    mode: 0o100644,
                    atime: 1_577_934_245,
                    mtime: 1_577_934_245,
                    ..Default::default()
                },
            }],
        });
        round_trip(Packet::Attrs {
            id: 6,
            attrs: FileAttrs {
                flags: ATTR_SIZE,
                size: 99,
                ..Default::default()
            },
        });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = Bytes::from_static(&[250, 0, 0, 0, 1]);
        assert!(matches!(
            Packet::decode(&mut bytes),
            Err(ProtocolError::UnknownPacketType(250))
        ));
    }

    #[test]
    fn truncated_body_is_short_packet() {
        let full = Packet::Stat {
            id: 7,
            path: "/a.txt".into(),
        }
        .encode();
        for cut in 1..full.len() {
            let mut bytes = full.slice(..cut);
            assert!(
                matches!(Packet::decode(&mut bytes), Err(ProtocolError::ShortPacket)),
                "truncation at {cut} must fail cleanly"
            );
        }
    }

    #[tokio::test]
    async fn framed_round_trip() {
        let packet = Packet::Open {
            id: 42,
            path: "/f".into(),
            pflags: FXF_READ,
            attrs: FileAttrs::default(),
        };
        let mut framed = Vec::new();
        write_packet(&mut framed, &packet).await.unwrap();
        let body = packet.encode();
        assert_eq!(framed.len(), 4 + body.len());
        assert_eq!(framed[..4], (body.len() as u32).to_be_bytes());

        let mut cursor = std::io::Cursor::new(framed);
        let decoded = read_packet(&mut cursor).await.unwrap();
        assert_eq!(decoded, packet);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut framed = Vec::new();
        framed.extend_from_slice(&(MAX_PACKET_SIZE + 1).to_be_bytes());
        framed.push(FXP_INIT);
        let mut cursor = std::io::Cursor::new(framed);
        assert!(matches!(
            read_packet(&mut cursor).await,
            Err(ProtocolError::PacketTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn undersized_frame_is_rejected() {
        for len in [0u32, 1] {
            let mut framed = Vec::new();
            framed.extend_from_slice(&len.to_be_bytes());
            framed.push(FXP_INIT);
            let mut cursor = std::io::Cursor::new(framed);
            assert!(matches!(
                read_packet(&mut cursor).await,
                Err(ProtocolError::PacketTooSmall(_))
            ));
        }
    }
}
