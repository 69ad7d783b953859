use block_dev::DeviceError;
use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "I/O error: {}", _0)]
    Io(DeviceError),
    #[display(fmt = "no space left on device")]
    NoSpace,
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "invalid argument")]
    InvalidArgument,
    #[display(fmt = "file exists")]
    Exists,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "is a directory")]
    IsADirectory,
    /// 磁盘记录无法解码
    #[display(fmt = "corrupted {} record", _0)]
    Corrupted(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// 对应的 errno，交给内核适配层原样返回（取负）
    pub const fn errno(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Corrupted(_) => 5,
            Self::NotFound => 2,
            Self::Exists => 17,
            Self::NotADirectory => 20,
            Self::IsADirectory => 21,
            Self::InvalidArgument => 22,
            Self::NoSpace => 28,
        }
    }
}

impl From<DeviceError> for Error {
    #[inline]
    fn from(err: DeviceError) -> Self {
        Self::Io(err)
    }
}
