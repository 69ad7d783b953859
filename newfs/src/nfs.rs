//! # 挂载层
//!
//! 一次挂载就是一个 [`NewFs`] 会话：它独占设备，持有超级块、两张位图
//! 以及整棵内存文件树。位图与超级块只在挂载时读入、在同步与卸载时写回。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use core::fmt::Write;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::layout::{Bitmap, DiskSuperBlock};
use crate::vfs::{Dentries, Dentry, DentryId};
use crate::{Driver, Error, Result, ROOT_INO};

pub struct NewFs {
    pub(crate) driver: Driver,
    sb: DiskSuperBlock,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) data_bitmap: Bitmap,
    pub(crate) dentries: Dentries,
    pub(crate) root: DentryId,
    mounted: bool,
}

impl NewFs {
    /// 挂载设备。
    ///
    /// 魔数不对的设备视为新盘：按容量计算布局，写入空位图、超级块与根目录。
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let driver = Driver::new(dev)?;
        let disk_size = driver.disk_size();
        let block_size = driver.block_size();

        let mut buf = [0u8; DiskSuperBlock::SIZE];
        driver.read(0, &mut buf)?;
        let on_disk = DiskSuperBlock::decode(&buf)?;
        let fresh = !on_disk.is_valid();
        let sb = if fresh {
            log::info!("no newfs found, formatting {disk_size} bytes");
            DiskSuperBlock::compute(disk_size, block_size)?
        } else {
            on_disk
        };

        let inode_map_len = sb.map_inode_blks as usize * block_size;
        let data_map_len = sb.map_data_blks as usize * block_size;
        let data_blocks = sb.data_blocks(disk_size, block_size);
        let (inode_bitmap, data_bitmap) = if fresh {
            (
                Bitmap::new(inode_map_len, sb.max_ino as usize),
                Bitmap::new(data_map_len, data_blocks),
            )
        } else {
            let mut inode_map = vec![0; inode_map_len];
            driver.read(sb.map_inode_offset as usize, &mut inode_map)?;
            let mut data_map = vec![0; data_map_len];
            driver.read(sb.map_data_offset as usize, &mut data_map)?;
            (
                Bitmap::from_bytes(inode_map, sb.max_ino as usize),
                Bitmap::from_bytes(data_map, data_blocks),
            )
        };

        let mut dentries = Dentries::default();
        let root = dentries.insert(Dentry::root());
        let mut fs = Self {
            driver,
            sb,
            inode_bitmap,
            data_bitmap,
            dentries,
            root,
            mounted: true,
        };

        if fresh {
            fs.alloc_inode(root)?;
            if fs.dentry(root)?.ino() != Some(ROOT_INO) {
                log::error!("root didn't get inode {ROOT_INO}");
                return Err(Error::Corrupted("inode bitmap"));
            }
            fs.sync()?;
        } else {
            fs.read_inode(root)?;
        }

        fs.dump_map();
        log::info!(
            "mounted newfs: {} inodes, {data_blocks} data blocks of {block_size} bytes",
            fs.sb.max_ino
        );
        Ok(fs)
    }

    /// 挂载并放进一把大锁里，供多线程的适配层共用
    pub fn mount_shared(dev: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>> {
        Ok(Arc::new(Mutex::new(Self::mount(dev)?)))
    }

    /// 整棵树落盘后关闭设备。重复卸载什么也不做。
    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }

        self.sync()?;
        self.driver.close()?;
        self.mounted = false;

        log::info!("unmounted newfs");
        Ok(())
    }

    /// 写回内存中的整棵树、超级块与两张位图，不卸载
    pub fn sync(&self) -> Result<()> {
        self.sync_inode(self.root)?;

        let mut buf = [0u8; DiskSuperBlock::SIZE];
        self.sb.encode(&mut buf)?;
        self.driver.write(0, &buf)?;
        self.driver
            .write(self.sb.map_inode_offset as usize, self.inode_bitmap.as_bytes())?;
        self.driver
            .write(self.sb.map_data_offset as usize, self.data_bitmap.as_bytes())?;

        Ok(())
    }

    #[inline]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.driver.block_size()
    }

    /// 已分配数据块的总字节数
    #[inline]
    pub fn usage(&self) -> usize {
        self.sb.usage as usize
    }

    #[inline]
    pub fn super_block(&self) -> &DiskSuperBlock {
        &self.sb
    }

    #[inline]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub fn data_bitmap(&self) -> &Bitmap {
        &self.data_bitmap
    }

    /// 以调试日志打印两张位图，每个字节内从低位到高位
    pub fn dump_map(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }

        for (name, bitmap) in [("inode", &self.inode_bitmap), ("data", &self.data_bitmap)] {
            log::debug!(
                "{name} bitmap: {}/{} in use",
                bitmap.count(),
                bitmap.capacity()
            );

            let used_bytes = bitmap.capacity().div_ceil(8);
            for (row, bytes) in bitmap.as_bytes()[..used_bytes].chunks(8).enumerate() {
                let mut line = String::new();
                for byte in bytes {
                    let _ = write!(line, "{:08b} ", byte.reverse_bits());
                }
                log::debug!("{:6}: {}", row * 64, line.trim_end());
            }
        }
    }
}

impl NewFs {
    /// 分配一个数据块，返回它在数据区内的编号
    pub(crate) fn alloc_data(&mut self) -> Result<u32> {
        let block = self.data_bitmap.alloc()?;
        match self.sb.usage.checked_add(self.block_size() as u32) {
            Some(usage) => self.sb.usage = usage,
            None => {
                self.data_bitmap.dealloc(block);
                return Err(Error::NoSpace);
            }
        }
        Ok(block)
    }

    pub(crate) fn free_data(&mut self, block: u32) {
        if !self.data_bitmap.is_set(block) {
            return;
        }
        self.data_bitmap.dealloc(block);
        self.sb.usage = self.sb.usage.saturating_sub(self.block_size() as u32);
    }

    #[inline]
    pub(crate) fn inode_offset(&self, ino: u32) -> usize {
        self.sb.inode_offset as usize + ino as usize * self.block_size()
    }

    #[inline]
    pub(crate) fn data_offset(&self, block: u32) -> usize {
        self.sb.data_offset as usize + block as usize * self.block_size()
    }
}
