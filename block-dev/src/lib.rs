//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、U盘、磁盘镜像文件等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 这里的“块”指设备的原生 I/O 单元，其大小由 [`Request::IoSize`] 查询得到，
//! 与文件系统自己的逻辑块大小无关。
//! 打开设备是驱动自己的事（构造函数），关闭设备则通过 [`BlockDevice::close`]。

#![no_std]

use core::any::Any;
use core::fmt;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读取编号为`block_id`的 I/O 单元，`buf`的长度恰为一个单元。
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// 写入编号为`block_id`的 I/O 单元，`buf`的长度恰为一个单元。
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError>;

    /// 查询设备参数
    fn ioctl(&self, request: Request) -> Result<usize, DeviceError>;

    /// 释放设备，之后不应再有读写
    fn close(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// `ioctl` 可查询的设备参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// 设备总字节数
    DiskSize,
    /// 原生 I/O 单元的字节数
    IoSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    Read { block_id: usize },
    Write { block_id: usize },
    Unsupported(Request),
    /// 关闭时未能把缓冲的数据写回设备
    Flush,
    Closed,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { block_id } => write!(f, "failed to read I/O unit {block_id}"),
            Self::Write { block_id } => write!(f, "failed to write I/O unit {block_id}"),
            Self::Unsupported(request) => write!(f, "unsupported ioctl request {request:?}"),
            Self::Flush => f.write_str("failed to flush device"),
            Self::Closed => f.write_str("device already closed"),
        }
    }
}
