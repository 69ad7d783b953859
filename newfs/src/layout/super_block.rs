use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};

use super::to_u32;
use crate::{DATA_PER_FILE, INODE_PER_FILE, MAGIC};
use crate::{Error, Result};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskSuperBlock {
    /// 魔数：用于校验文件系统合法性
    pub magic: u32,
    /// 最多支持的文件数，即 inode 区域的块数
    pub max_ino: u32,
    pub map_inode_blks: u32,
    pub map_inode_offset: u32,
    pub map_data_blks: u32,
    pub map_data_offset: u32,
    pub inode_offset: u32,
    pub data_offset: u32,
    /// 已分配数据块的总字节数
    pub usage: u32,
}

impl DiskSuperBlock {
    pub const SIZE: usize = 36;

    /// 按设备容量推算新盘的布局。
    ///
    /// 每个文件按 1 个 inode 块加 [`DATA_PER_FILE`] 个数据块估算文件数，
    /// 再扣去超级块与两张位图占用的块。
    pub fn compute(disk_size: usize, block_size: usize) -> Result<Self> {
        let super_blks = Self::SIZE.div_ceil(block_size);
        let disk_blks = disk_size / block_size;
        let inode_num = disk_size / ((DATA_PER_FILE + INODE_PER_FILE) * block_size);

        let map_inode_blks = inode_num.div_ceil(8).div_ceil(block_size);
        let map_data_blks = disk_blks.div_ceil(8).div_ceil(block_size);

        let max_ino = inode_num
            .checked_sub(super_blks + map_inode_blks + map_data_blks)
            .filter(|&max_ino| max_ino > 0)
            .ok_or(Error::InvalidArgument)?;

        let map_inode_offset = super_blks * block_size;
        let map_data_offset = map_inode_offset + map_inode_blks * block_size;
        let inode_offset = map_data_offset + map_data_blks * block_size;
        let data_offset = inode_offset + max_ino * block_size;
        if data_offset >= disk_blks * block_size {
            return Err(Error::InvalidArgument);
        }
        // 用量以 u32 字节计，数据区不能超过它的表示范围
        to_u32(disk_blks * block_size - data_offset)?;

        Ok(Self {
            magic: MAGIC,
            max_ino: to_u32(max_ino)?,
            map_inode_blks: to_u32(map_inode_blks)?,
            map_inode_offset: to_u32(map_inode_offset)?,
            map_data_blks: to_u32(map_data_blks)?,
            map_data_offset: to_u32(map_data_offset)?,
            inode_offset: to_u32(inode_offset)?,
            data_offset: to_u32(data_offset)?,
            usage: 0,
        })
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 数据区的块数
    #[inline]
    pub fn data_blocks(&self, disk_size: usize, block_size: usize) -> usize {
        (disk_size / block_size).saturating_sub(self.data_offset as usize / block_size)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(buf)).map_err(|_| Error::Corrupted("super block"))
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        self.write(&mut Cursor::new(buf))
            .map_err(|_| Error::Corrupted("super block"))
    }
}
