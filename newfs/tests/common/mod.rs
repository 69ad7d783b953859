#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use newfs::{BlockDevice, DeviceError, Request};
use spin::Mutex;

/// 内存里的块设备，卸载后内容仍在，可以再次挂载
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    io_size: usize,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl RamDisk {
    pub fn new(disk_size: usize, io_size: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(vec![0; disk_size]),
            io_size,
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// 之后的写入一律失败
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// 设备上`offset`处的`len`个字节
    pub fn bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data.lock()[offset..offset + len].to_vec()
    }

    /// 绕过文件系统直接改写设备内容
    pub fn patch(&self, offset: usize, bytes: &[u8]) {
        self.data.lock()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 重新打开：同一份数据，新的设备句柄
    pub fn reopen(&self) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(self.data.lock().clone()),
            io_size: self.io_size,
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let data = self.data.lock();
        let start = block_id * self.io_size;
        let unit = data
            .get(start..start + self.io_size)
            .ok_or(DeviceError::Read { block_id })?;
        buf.copy_from_slice(unit);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        if self.is_closed() {
            return Err(DeviceError::Closed);
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(DeviceError::Write { block_id });
        }

        let mut data = self.data.lock();
        let start = block_id * self.io_size;
        data.get_mut(start..start + self.io_size)
            .ok_or(DeviceError::Write { block_id })?
            .copy_from_slice(buf);
        Ok(())
    }

    fn ioctl(&self, request: Request) -> Result<usize, DeviceError> {
        Ok(match request {
            Request::DiskSize => self.data.lock().len(),
            Request::IoSize => self.io_size,
        })
    }

    fn close(&self) -> Result<(), DeviceError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
