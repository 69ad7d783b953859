//! # 驱动适配层
//!
//! 设备只认原生 I/O 单元，而上层会在任意偏移读写任意长度。
//! [`Driver`] 把请求扩到逻辑块边界：读时整块读入再截取，
//! 写时先读出整段、拼入新数据再整段写回（read-modify-write）。
//!
//! 逻辑块大小恒为 I/O 单元的两倍，所以每个块对应两次设备操作。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::{BlockDevice, Request};

use crate::{Error, Result};

pub struct Driver {
    dev: Arc<dyn BlockDevice>,
    io_size: usize,
    block_size: usize,
    disk_size: usize,
}

impl Driver {
    /// 向设备查询容量与 I/O 单元，逻辑块取 I/O 单元的两倍
    pub fn new(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let disk_size = dev.ioctl(Request::DiskSize)?;
        let io_size = dev.ioctl(Request::IoSize)?;
        log::debug!("disk size: {disk_size}, io size: {io_size}");
        if io_size == 0 {
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            dev,
            io_size,
            block_size: 2 * io_size,
            disk_size,
        })
    }

    #[inline]
    pub fn io_size(&self) -> usize {
        self.io_size
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn disk_size(&self) -> usize {
        self.disk_size
    }

    /// 从字节偏移`offset`处读满`buf`
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let (aligned_offset, bias, aligned_len) = self.align(offset, buf.len());
        let span = self.read_span(aligned_offset, aligned_len)?;
        buf.copy_from_slice(&span[bias..bias + buf.len()]);

        Ok(())
    }

    /// 把`data`写到字节偏移`offset`处，块内其余字节保持原样
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let (aligned_offset, bias, aligned_len) = self.align(offset, data.len());
        let mut span = self.read_span(aligned_offset, aligned_len)?;
        span[bias..bias + data.len()].copy_from_slice(data);

        let first = aligned_offset / self.io_size;
        for (i, unit) in span.chunks(self.io_size).enumerate() {
            self.dev.write_block(first + i, unit)?;
        }

        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.dev.close()?;
        Ok(())
    }
}

impl Driver {
    /// 返回（对齐后的起始偏移，请求在其中的偏置，对齐后的长度）
    fn align(&self, offset: usize, len: usize) -> (usize, usize, usize) {
        let aligned_offset = offset / self.block_size * self.block_size;
        let bias = offset - aligned_offset;
        let aligned_len = (bias + len).div_ceil(self.block_size) * self.block_size;

        (aligned_offset, bias, aligned_len)
    }

    fn read_span(&self, aligned_offset: usize, aligned_len: usize) -> Result<Vec<u8>> {
        let mut span = vec![0; aligned_len];
        let first = aligned_offset / self.io_size;
        for (i, unit) in span.chunks_mut(self.io_size).enumerate() {
            self.dev.read_block(first + i, unit)?;
        }

        Ok(span)
    }
}
