//! Protocol constants.

pub const PROTOCOL_VERSION: u32 = 3;

pub const FXP_INIT: u8 = 1;
pub const FXP_VERSION: u8 = 2;
pub const FXP_OPEN: u8 = 3;
pub const FXP_CLOSE: u8 = 4;
pub const FXP_READ: u8 = 5;
pub const FXP_WRITE: u8 = 6;
pub const FXP_LSTAT: u8 = 7;
pub const FXP_FSTAT: u8 = 8;
pub const FXP_SETSTAT: u8 = 9;
pub const FXP_FSETSTAT: u8 = 10;
pub const FXP_OPENDIR: u8 = 11;
pub const FXP_READDIR: u8 = 12;
pub const FXP_REMOVE: u8 = 13;
pub const FXP_MKDIR: u8 = 14;
pub const FXP_RMDIR: u8 = 15;
pub const FXP_REALPATH: u8 = 16;
pub const FXP_STAT: u8 = 17;
pub const FXP_RENAME: u8 = 18;
pub const FXP_READLINK: u8 = 19;
pub const FXP_SYMLINK: u8 = 20;
pub const FXP_STATUS: u8 = 101;
pub const FXP_HANDLE: u8 = 102;
pub const FXP_DATA: u8 = 103;
pub const FXP_NAME: u8 = 104;
pub const FXP_ATTRS: u8 = 105;
pub const FXP_EXTENDED: u8 = 200;
pub const FXP_EXTENDED_REPLY: u8 = 201;

pub const FX_OK: u32 = 0;
pub const FX_EOF: u32 = 1;
pub const FX_NO_SUCH_FILE: u32 = 2;
pub const FX_PERMISSION_DENIED: u32 = 3;
pub const FX_FAILURE: u32 = 4;
pub const FX_BAD_MESSAGE: u32 = 5;
pub const FX_NO_CONNECTION: u32 = 6;
pub const FX_CONNECTION_LOST: u32 = 7;
pub const FX_OP_UNSUPPORTED: u32 = 8;

// Codes from draft-ietf-secsh-filexfer-13 §9.1; a v3 server never sends
// these but clients speaking later drafts may surface them.
pub const FX_INVALID_HANDLE: u32 = 9;
pub const FX_NO_SUCH_PATH: u32 = 10;
pub const FX_FILE_ALREADY_EXISTS: u32 = 11;
pub const FX_WRITE_PROTECT: u32 = 12;
pub const FX_NO_MEDIA: u32 = 13;
pub const FX_NO_SPACE_ON_FILESYSTEM: u32 = 14;
pub const FX_QUOTA_EXCEEDED: u32 = 15;
pub const FX_UNKNOWN_PRINCIPAL: u32 = 16;
pub const FX_LOCK_CONFLICT: u32 = 17;
pub const FX_DIR_NOT_EMPTY: u32 = 18;
pub const FX_NOT_A_DIRECTORY: u32 = 19;
pub const FX_INVALID_FILENAME: u32 = 20;
pub const FX_LINK_LOOP: u32 = 21;
pub const FX_CANNOT_DELETE: u32 = 22;
pub const FX_INVALID_PARAMETER: u32 = 23;
pub const FX_FILE_IS_A_DIRECTORY: u32 = 24;

pub const FXF_READ: u32 = 0x00000001;
pub const FXF_WRITE: u32 = 0x00000002;
pub const FXF_APPEND: u32 = 0x00000004;
pub const FXF_CREAT: u32 = 0x00000008;
pub const FXF_TRUNC: u32 = 0x00000010;
pub const FXF_EXCL: u32 = 0x00000020;

pub const ATTR_SIZE: u32 = 0x00000001;
pub const ATTR_UIDGID: u32 = 0x00000002;
pub const ATTR_PERMISSIONS: u32 = 0x00000004;
pub const ATTR_ACMODTIME: u32 = 0x00000008;
pub const ATTR_EXTENDED: u32 = 0x80000000;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// Human-readable name of a packet-type tag, for logs and errors.
pub fn packet_type_name(tag: u8) -> &'static str {
    match tag {
        FXP_INIT => "FXP_INIT",
        FXP_VERSION => "FXP_VERSION",
        FXP_OPEN => "FXP_OPEN",
        FXP_CLOSE => "FXP_CLOSE",
        FXP_READ => "FXP_READ",
        FXP_WRITE => "FXP_WRITE",
        FXP_LSTAT => "FXP_LSTAT",
        FXP_FSTAT => "FXP_FSTAT",
        FXP_SETSTAT => "FXP_SETSTAT",
        FXP_FSETSTAT => "FXP_FSETSTAT",
        FXP_OPENDIR => "FXP_OPENDIR",
        FXP_READDIR => "FXP_READDIR",
        FXP_REMOVE => "FXP_REMOVE",
        FXP_MKDIR => "FXP_MKDIR",
        FXP_RMDIR => "FXP_RMDIR",
        FXP_REALPATH => "FXP_REALPATH",
        FXP_STAT => "FXP_STAT",
        FXP_RENAME => "FXP_RENAME",
        FXP_READLINK => "FXP_READLINK",
        FXP_SYMLINK => "FXP_SYMLINK",
        FXP_STATUS => "FXP_STATUS",
        FXP_HANDLE => "FXP_HANDLE",
        FXP_DATA => "FXP_DATA",
        FXP_NAME => "FXP_NAME",
        FXP_ATTRS => "FXP_ATTRS",
        FXP_EXTENDED => "FXP_EXTENDED",
        FXP_EXTENDED_REPLY => "FXP_EXTENDED_REPLY",
        _ => "unknown",
    }
}

/// Human-readable name of a status code, for logs and errors.
pub fn status_code_name(code: u32) -> &'static str {
    match code {
        FX_OK => "FX_OK",
        FX_EOF => "FX_EOF",
        FX_NO_SUCH_FILE => "FX_NO_SUCH_FILE",
        FX_PERMISSION_DENIED => "FX_PERMISSION_DENIED",
        FX_FAILURE => "FX_FAILURE",
        FX_BAD_MESSAGE => "FX_BAD_MESSAGE",
        FX_NO_CONNECTION => "FX_NO_CONNECTION",
        FX_CONNECTION_LOST => "FX_CONNECTION_LOST",
        FX_OP_UNSUPPORTED => "FX_OP_UNSUPPORTED",
        _ => "unknown",
    }
}
