use alloc::vec;
use alloc::vec::Vec;

use crate::{Error, Result};

/// 位图，记录其指示区域的分配情况。
///
/// 挂载期间整张位图都在内存里，只在挂载与卸载时与磁盘交换。
/// 位序：先按字节，再按字节内的低位到高位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    /// 可分配的编号上限，不超过位图的总位数
    capacity: usize,
}

impl Bitmap {
    /// 全空的位图
    #[inline]
    pub fn new(bytes: usize, capacity: usize) -> Self {
        Self::from_bytes(vec![0; bytes], capacity)
    }

    /// 以磁盘上读出的字节构造
    pub fn from_bytes(bits: Vec<u8>, capacity: usize) -> Self {
        let capacity = capacity.min(bits.len() * 8);
        Self { bits, capacity }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 首次适配：分配编号最小的空闲位
    pub fn alloc(&mut self) -> Result<u32> {
        let Some((byte_index, bit_index)) = self
            .bits
            .iter()
            .enumerate()
            .find_map(|(byte_index, &byte)| {
                (byte != u8::MAX).then_some((byte_index, byte.trailing_ones() as usize))
            })
        else {
            return Err(Error::NoSpace);
        };

        // 更低的编号都已占用，此处越界即是满了
        let id = byte_index * 8 + bit_index;
        if id >= self.capacity {
            return Err(Error::NoSpace);
        }

        self.bits[byte_index] |= 1 << bit_index;
        Ok(id as u32)
    }

    /// 清除编号`id`对应的位；本就空闲则什么也不做
    pub fn dealloc(&mut self, id: u32) {
        let id = id as usize;
        if let Some(byte) = self.bits.get_mut(id / 8) {
            *byte &= !(1 << (id % 8));
        }
    }

    pub fn is_set(&self, id: u32) -> bool {
        let id = id as usize;
        self.bits
            .get(id / 8)
            .is_some_and(|byte| byte & (1 << (id % 8)) != 0)
    }

    /// 已占用的位数
    pub fn count(&self) -> usize {
        self.bits.iter().map(|byte| byte.count_ones() as usize).sum()
    }
}
