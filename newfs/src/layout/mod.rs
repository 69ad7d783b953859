//! # 磁盘数据结构层
//!
//! newfs 的磁盘布局（偏移皆为逻辑块大小的整数倍）：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域（每个 inode 独占一块） | 数据块区域
//!
//! 磁盘记录一律小端序，由 binrw 编解码，不依赖内存布局。

mod super_block;
pub use super_block::DiskSuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, FileKind};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

use crate::{Error, Result};

#[inline]
fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidArgument)
}
