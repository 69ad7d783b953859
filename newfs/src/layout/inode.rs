use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};

use crate::DATA_PER_FILE;
use crate::{Error, Result};

/// 磁盘上的 inode，每个 inode 独占 inode 区域中的一块。
///
/// 只记录数据块的编号，块的内容在数据区。
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 在 inode 位图中的下标
    pub ino: u32,
    /// 文件已占用的字节数
    pub size: u32,
    pub kind: FileKind,
    /// 目录下的目录项个数，文件恒为0
    pub dir_cnt: u32,
    /// 数据块编号（数据区内的下标）。
    /// 文件占满全部，目录只用第一个，且仅当`dir_cnt > 0`时有效。
    pub blocks: [u32; DATA_PER_FILE],
}

#[binrw]
#[brw(repr = u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    #[default]
    File = 0,
    Directory = 1,
}

impl DiskInode {
    pub const SIZE: usize = 16 + 4 * DATA_PER_FILE;

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(buf)).map_err(|_| Error::Corrupted("inode"))
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        self.write(&mut Cursor::new(buf))
            .map_err(|_| Error::Corrupted("inode"))
    }
}
