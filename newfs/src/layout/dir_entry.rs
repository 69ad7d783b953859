use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};

use super::FileKind;
use crate::MAX_NAME_LEN;
use crate::{Error, Result};

/// 目录项的磁盘记录。
///
/// 一个目录的全部目录项从它的数据块起始处紧密排列。
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 名字按实际长度拷入，剩余字节为0；名字占满时没有结尾的0
    name: [u8; MAX_NAME_LEN],
    pub kind: FileKind,
    /// 指向的 inode 编号
    pub ino: u32,
}

impl DirEntry {
    /// 记录大小恒为136字节
    pub const SIZE: usize = MAX_NAME_LEN + 8;

    pub fn new(name: &str, kind: FileKind, ino: u32) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_NAME_LEN || bytes.contains(&0) {
            return Err(Error::InvalidArgument);
        }

        let mut name = [0; MAX_NAME_LEN];
        name[..bytes.len()].copy_from_slice(bytes);

        Ok(Self { name, kind, ino })
    }

    pub fn name(&self) -> Result<&str> {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).map_err(|_| Error::Corrupted("dir entry"))
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(buf)).map_err(|_| Error::Corrupted("dir entry"))
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        self.write(&mut Cursor::new(buf))
            .map_err(|_| Error::Corrupted("dir entry"))
    }
}
