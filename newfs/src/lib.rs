#![no_std]

extern crate alloc;

/* newfs 的整体架构，自上而下 */

// 路径解析层：逐级查找目录项
mod path;
pub use path::Lookup;

// 内存文件树层：inode 与目录项的增删、懒加载、落盘
mod vfs;
pub use vfs::{Dentry, DentryId, Stat, StatKind};

// 挂载层：挂载、卸载，持有整个会话的状态
mod nfs;
pub use nfs::NewFs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;
pub use layout::{Bitmap, DirEntry, DiskInode, DiskSuperBlock, FileKind};

// 驱动适配层：把任意偏移的读写对齐到块
mod driver;
pub use driver::Driver;

mod error;
pub use error::{Error, Result};

pub use block_dev::{BlockDevice, DeviceError, Request};

pub const MAGIC: u32 = 0x5241_5453;
/// 根目录的 inode 编号
pub const ROOT_INO: u32 = 0;
/// 每个文件固定占用的数据块数
pub const DATA_PER_FILE: usize = 6;
/// 每个文件占用的 inode 块数
pub const INODE_PER_FILE: usize = 1;
/// 文件名最长字节数
pub const MAX_NAME_LEN: usize = 128;
/// 不做权限检查，一律按此权限汇报
pub const DEFAULT_PERM: u32 = 0o777;
