
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use block_dev::{BlockDevice, DeviceError, Request};

/// 镜像文件的 I/O 单元，与 VirtIO 块设备的扇区一致
pub const SECTOR_SIZE: usize = 512;

/// 以宿主机上的文件充当块设备，可在线程间共享
#[derive(Debug)]
pub struct BlockFile {
    inner: Mutex<File>,
    io_size: usize,
}

impl BlockFile {
    pub fn new(fd: File, io_size: usize) -> Self {
        Self {
            inner: Mutex::new(fd),
            io_size,
        }
    }

    /// 以读写方式打开已有的镜像
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(fd, SECTOR_SIZE))
    }

    /// 持锁的线程崩溃不影响文件本身，照常使用
    fn file(&self) -> MutexGuard<'_, File> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seek(file: &mut File, offset: usize) -> io::Result<()> {
        file.seek(SeekFrom::Start(offset as u64)).map(drop)
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let mut file = self.file();
        Self::seek(&mut file, block_id * self.io_size)
            .and_then(|()| file.read_exact(buf))
            .map_err(|err| {
                log::error!("reading unit {block_id}: {err}");
                DeviceError::Read { block_id }
            })
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let mut file = self.file();
        Self::seek(&mut file, block_id * self.io_size)
            .and_then(|()| file.write_all(buf))
            .map_err(|err| {
                log::error!("writing unit {block_id}: {err}");
                DeviceError::Write { block_id }
            })
    }

    fn ioctl(&self, request: Request) -> Result<usize, DeviceError> {
        match request {
            Request::DiskSize => self
                .file()
                .metadata()
                .map(|meta| meta.len() as usize)
                .map_err(|err| {
                    log::error!("querying image size: {err}");
                    DeviceError::Unsupported(request)
                }),
            Request::IoSize => Ok(self.io_size),
        }
    }

    fn close(&self) -> Result<(), DeviceError> {
        self.file().sync_all().map_err(|err| {
            log::error!("flushing image: {err}");
            DeviceError::Flush
        })
    }
}
