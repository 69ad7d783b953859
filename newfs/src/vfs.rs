//! # 内存文件树层
//!
//! 目录项（[`Dentry`]）存放在会话持有的表里，以 [`DentryId`] 互相指引：
//! 目录 inode 持有子目录项的编号，目录项持有它指向的 inode（可能尚未加载）。
//!
//! inode 只在用到时才从磁盘读入，读入后一直留在内存，直到卸载时整棵树落盘。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use derive_more::{From, Into};
use enumflags2::bitflags;

use crate::layout::{DirEntry, DiskInode, FileKind};
use crate::{DATA_PER_FILE, DEFAULT_PERM, MAX_NAME_LEN, ROOT_INO};
use crate::{Error, NewFs, Result};

/// 目录项的编号。目录项被移除后，其编号作废。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
pub struct DentryId(usize);

#[derive(Debug)]
pub struct Dentry {
    name: String,
    kind: FileKind,
    /// 分配了 inode 之后才有效
    ino: Option<u32>,
    parent: Option<DentryId>,
    /// 懒加载的 inode
    inode: Option<Inode>,
}

#[derive(Debug)]
pub(crate) struct Inode {
    ino: u32,
    size: u32,
    body: InodeBody,
}

#[derive(Debug)]
enum InodeBody {
    Directory {
        /// 首个子项插入时分配，最后一个子项移除时释放
        block: Option<u32>,
        children: Vec<DentryId>,
    },
    File {
        blocks: [u32; DATA_PER_FILE],
        /// 全部数据块的内容，按`blocks`的顺序首尾相接
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub ino: u64,
    pub kind: StatKind,
    pub perm: u32,
    pub size: u64,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying blocks
    pub blocks: u64,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    FILE = 0o100000,
}

/// 目录项表
#[derive(Debug, Default)]
pub(crate) struct Dentries {
    slots: Vec<Option<Dentry>>,
    free: Vec<DentryId>,
}

impl Dentry {
    pub(crate) fn new(name: &str, kind: FileKind, parent: Option<DentryId>) -> Self {
        Self {
            name: name.into(),
            kind,
            ino: None,
            parent,
            inode: None,
        }
    }

    /// 根目录的目录项，inode 编号固定
    pub(crate) fn root() -> Self {
        Self {
            ino: Some(ROOT_INO),
            ..Self::new("/", FileKind::Directory, None)
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    #[inline]
    pub fn ino(&self) -> Option<u32> {
        self.ino
    }

    #[inline]
    pub fn parent(&self) -> Option<DentryId> {
        self.parent
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.inode.is_some()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// 已加载目录的子项
    pub(crate) fn children(&self) -> Option<&[DentryId]> {
        match &self.inode.as_ref()?.body {
            InodeBody::Directory { children, .. } => Some(children),
            InodeBody::File { .. } => None,
        }
    }
}

impl NewFs {
    #[inline]
    pub fn root(&self) -> DentryId {
        self.root
    }

    pub fn dentry(&self, id: DentryId) -> Result<&Dentry> {
        self.dentries.get(id).ok_or(Error::InvalidArgument)
    }

    /// 在目录`parent`下创建名为`name`的文件或目录
    pub fn create(&mut self, parent: DentryId, name: &str, kind: FileKind) -> Result<DentryId> {
        check_name(name)?;

        self.load(parent)?;
        let children = self.dentry(parent)?.children().ok_or(Error::NotADirectory)?;
        if children
            .iter()
            .any(|&child| self.dentries.get(child).is_some_and(|d| d.name == name))
        {
            return Err(Error::Exists);
        }

        let id = self.dentries.insert(Dentry::new(name, kind, Some(parent)));
        if let Err(err) = self.insert_dentry(parent, id) {
            self.dentries.remove(id);
            return Err(err);
        }
        if let Err(err) = self.alloc_inode(id) {
            self.remove_entry(parent, id)?;
            return Err(err);
        }

        log::debug!("created {name:?} ({kind:?}) under {parent:?}");
        Ok(id)
    }

    /// 把`dentry`从目录`parent`中摘下并销毁，连同其下尚在内存的目录项。
    ///
    /// 不回收 inode，需要时先调用 [`NewFs::drop_inode`]。
    pub fn remove_entry(&mut self, parent: DentryId, dentry: DentryId) -> Result<()> {
        self.unlink_dentry(parent, dentry)?;
        self.forget(dentry);
        Ok(())
    }

    /// 目录`dir`的第`index`个子项
    pub fn readdir(&mut self, dir: DentryId, index: usize) -> Result<Option<DentryId>> {
        Ok(self.children(dir)?.get(index).copied())
    }

    pub fn children(&mut self, dir: DentryId) -> Result<&[DentryId]> {
        self.load(dir)?;
        self.dentry(dir)?.children().ok_or(Error::NotADirectory)
    }

    /// 从文件的`offset`处读出数据填充`buf`，返回读到的字节数
    pub fn read_file(&mut self, file: DentryId, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let inode = self.loaded(file)?;
        let InodeBody::File { data, .. } = &inode.body else {
            return Err(Error::IsADirectory);
        };

        let Some(end) = offset.checked_add(buf.len()) else {
            return Ok(0);
        };
        let end = end.min(inode.size as usize);
        if offset >= end {
            return Ok(0);
        }

        let len = end - offset;
        buf[..len].copy_from_slice(&data[offset..end]);
        Ok(len)
    }

    /// 把`buf`写到文件的`offset`处。文件容量固定，越界即没有空间。
    pub fn write_file(&mut self, file: DentryId, offset: usize, buf: &[u8]) -> Result<usize> {
        let inode = self.loaded_mut(file)?;
        let InodeBody::File { data, .. } = &mut inode.body else {
            return Err(Error::IsADirectory);
        };

        let end = offset.checked_add(buf.len()).ok_or(Error::NoSpace)?;
        if end > data.len() {
            return Err(Error::NoSpace);
        }

        data[offset..end].copy_from_slice(buf);
        inode.size = inode.size.max(end as u32);
        Ok(buf.len())
    }

    /// 把文件截断或扩展（补0）到`size`字节
    pub fn truncate(&mut self, file: DentryId, size: usize) -> Result<()> {
        let inode = self.loaded_mut(file)?;
        let InodeBody::File { data, .. } = &mut inode.body else {
            return Err(Error::IsADirectory);
        };

        if size > data.len() {
            return Err(Error::NoSpace);
        }

        if size < inode.size as usize {
            data[size..inode.size as usize].fill(0);
        }
        inode.size = size as u32;
        Ok(())
    }

    pub fn stat(&mut self, dentry: DentryId) -> Result<Stat> {
        let block_size = self.block_size() as u64;
        let inode = self.loaded(dentry)?;
        let (kind, size, blocks) = match &inode.body {
            InodeBody::Directory { block, children } => (
                StatKind::DIR,
                (children.len() * DirEntry::SIZE) as u64,
                block.iter().count() as u64,
            ),
            InodeBody::File { .. } => (StatKind::FILE, inode.size as u64, DATA_PER_FILE as u64),
        };

        Ok(Stat {
            ino: inode.ino as u64,
            kind,
            perm: DEFAULT_PERM,
            size,
            block_size,
            blocks,
        })
    }

    /// 回收`dentry`指向的 inode 及其下的整棵子树：清位图、释放数据块与内存。
    ///
    /// 根目录不可回收。`dentry`本身仍留在父目录中，由调用者摘下。
    pub fn drop_inode(&mut self, dentry: DentryId) -> Result<()> {
        if dentry == self.root {
            return Err(Error::InvalidArgument);
        }

        self.load(dentry)?;
        let target = self.dentries.get_mut(dentry).ok_or(Error::InvalidArgument)?;
        let inode = target.inode.take().ok_or(Error::InvalidArgument)?;
        target.ino = None;

        match inode.body {
            InodeBody::Directory { block, children } => {
                for child in children {
                    self.drop_inode(child)?;
                    self.forget(child);
                }
                if let Some(block) = block {
                    self.free_data(block);
                }
            }
            InodeBody::File { blocks, .. } => {
                for block in blocks {
                    self.free_data(block);
                }
            }
        }
        self.inode_bitmap.dealloc(inode.ino);

        log::debug!("dropped inode {}", inode.ino);
        Ok(())
    }
}

impl NewFs {
    /// 为目录项分配 inode。
    /// 文件一次性分配全部数据块，目录的数据块推迟到插入首个子项时。
    pub(crate) fn alloc_inode(&mut self, id: DentryId) -> Result<()> {
        let kind = self.dentry(id)?.kind;
        let ino = self.inode_bitmap.alloc()?;

        let body = match kind {
            FileKind::Directory => InodeBody::Directory {
                block: None,
                children: Vec::new(),
            },
            FileKind::File => {
                let mut blocks = [0; DATA_PER_FILE];
                for i in 0..DATA_PER_FILE {
                    match self.alloc_data() {
                        Ok(block) => blocks[i] = block,
                        Err(err) => {
                            blocks[..i].iter().for_each(|&block| self.free_data(block));
                            self.inode_bitmap.dealloc(ino);
                            return Err(err);
                        }
                    }
                }
                InodeBody::File {
                    blocks,
                    data: vec![0; DATA_PER_FILE * self.block_size()],
                }
            }
        };

        let dentry = self.dentries.get_mut(id).ok_or(Error::InvalidArgument)?;
        dentry.ino = Some(ino);
        dentry.inode = Some(Inode { ino, size: 0, body });
        Ok(())
    }

    /// 把`child`追加到已加载目录`parent`的子项末尾。
    /// 目录项必须装得进一个块。
    pub(crate) fn insert_dentry(&mut self, parent: DentryId, child: DentryId) -> Result<()> {
        let block_size = self.block_size();
        let (block, children) = self.dir_body(parent)?;
        if (children.len() + 1) * DirEntry::SIZE > block_size {
            return Err(Error::NoSpace);
        }

        if block.is_none() {
            let new_block = self.alloc_data()?;
            let (block, _) = self.dir_body(parent)?;
            *block = Some(new_block);
        }

        let (_, children) = self.dir_body(parent)?;
        children.push(child);
        Ok(())
    }

    /// 把`child`从目录`parent`的子项中摘下，子项清空时归还目录的数据块
    pub(crate) fn unlink_dentry(&mut self, parent: DentryId, child: DentryId) -> Result<()> {
        let (block, children) = self.dir_body(parent)?;
        let index = children
            .iter()
            .position(|&id| id == child)
            .ok_or(Error::NotFound)?;
        children.remove(index);

        if children.is_empty() {
            if let Some(block) = block.take() {
                self.free_data(block);
            }
        }
        Ok(())
    }

    /// 把`dentry`挂到目录`parent`下并改名为`name`，调用者保证不重名
    pub(crate) fn move_entry(&mut self, dentry: DentryId, parent: DentryId, name: &str) -> Result<()> {
        check_name(name)?;
        let old_parent = self.dentry(dentry)?.parent.ok_or(Error::InvalidArgument)?;
        if old_parent != parent {
            self.load(parent)?;
            self.insert_dentry(parent, dentry)?;
            self.unlink_dentry(old_parent, dentry)?;
        }

        let target = self.dentries.get_mut(dentry).ok_or(Error::InvalidArgument)?;
        target.name = name.into();
        target.parent = Some(parent);
        Ok(())
    }

    /// 从表中移除目录项及其下所有已加载的目录项
    pub(crate) fn forget(&mut self, id: DentryId) {
        let Some(dentry) = self.dentries.remove(id) else {
            return;
        };
        if let Some(Inode {
            body: InodeBody::Directory { children, .. },
            ..
        }) = dentry.inode
        {
            for child in children {
                self.forget(child);
            }
        }
    }

    /// 确保目录项的 inode 已在内存
    pub(crate) fn load(&mut self, id: DentryId) -> Result<()> {
        if self.dentry(id)?.is_loaded() {
            return Ok(());
        }
        self.read_inode(id)
    }

    /// 从磁盘读入目录项指向的 inode。
    /// 目录只建立子目录项，不递归加载；文件读入全部数据块。
    pub(crate) fn read_inode(&mut self, id: DentryId) -> Result<()> {
        let dentry = self.dentry(id)?;
        let kind = dentry.kind;
        let ino = dentry.ino.ok_or(Error::InvalidArgument)?;
        let block_size = self.block_size();

        let mut buf = [0u8; DiskInode::SIZE];
        self.driver.read(self.inode_offset(ino), &mut buf)?;
        let disk_inode = DiskInode::decode(&buf)?;
        if disk_inode.kind != kind || disk_inode.ino != ino {
            log::error!("inode {ino} doesn't match its dentry");
            return Err(Error::Corrupted("inode"));
        }

        let body = match kind {
            FileKind::Directory => {
                let dir_cnt = disk_inode.dir_cnt as usize;
                if dir_cnt * DirEntry::SIZE > block_size {
                    return Err(Error::Corrupted("inode"));
                }

                let block = (dir_cnt > 0).then_some(disk_inode.blocks[0]);
                let mut entries = Vec::with_capacity(dir_cnt);
                if let Some(block) = block {
                    let mut buf = vec![0; dir_cnt * DirEntry::SIZE];
                    self.driver.read(self.data_offset(block), &mut buf)?;
                    for raw in buf.chunks(DirEntry::SIZE) {
                        entries.push(DirEntry::decode(raw)?);
                    }
                }

                let mut children = Vec::with_capacity(dir_cnt);
                for entry in entries {
                    let mut child = Dentry::new(entry.name()?, entry.kind, Some(id));
                    child.ino = Some(entry.ino);
                    children.push(self.dentries.insert(child));
                }

                InodeBody::Directory { block, children }
            }
            FileKind::File => {
                let mut data = vec![0; DATA_PER_FILE * block_size];
                for (&block, chunk) in disk_inode.blocks.iter().zip(data.chunks_mut(block_size)) {
                    self.driver.read(self.data_offset(block), chunk)?;
                }

                InodeBody::File {
                    blocks: disk_inode.blocks,
                    data,
                }
            }
        };

        let size = match body {
            InodeBody::Directory { .. } => 0,
            InodeBody::File { .. } => disk_inode.size,
        };
        let dentry = self.dentries.get_mut(id).ok_or(Error::InvalidArgument)?;
        dentry.inode = Some(Inode { ino, size, body });

        log::trace!("loaded inode {ino} for {:?}", dentry.name);
        Ok(())
    }

    /// 把内存中的 inode 及其下已加载的整棵子树写回磁盘，先自身后子项。
    pub(crate) fn sync_inode(&self, id: DentryId) -> Result<()> {
        let dentry = self.dentry(id)?;
        let Some(inode) = &dentry.inode else {
            return Ok(());
        };
        let block_size = self.block_size();

        let mut disk_inode = DiskInode {
            ino: inode.ino,
            size: inode.size,
            kind: dentry.kind,
            ..Default::default()
        };
        match &inode.body {
            InodeBody::Directory { block, children } => {
                disk_inode.size = (children.len() * DirEntry::SIZE) as u32;
                disk_inode.dir_cnt = children.len() as u32;
                disk_inode.blocks[0] = block.unwrap_or_default();
            }
            InodeBody::File { blocks, .. } => disk_inode.blocks = *blocks,
        }

        let mut buf = [0u8; DiskInode::SIZE];
        disk_inode.encode(&mut buf)?;
        self.driver.write(self.inode_offset(inode.ino), &buf)?;

        match &inode.body {
            InodeBody::Directory { block, children } => {
                if let Some(block) = block {
                    let mut buf = vec![0; children.len() * DirEntry::SIZE];
                    for (&child, raw) in children.iter().zip(buf.chunks_mut(DirEntry::SIZE)) {
                        let child = self.dentry(child)?;
                        let ino = child.ino.ok_or(Error::InvalidArgument)?;
                        DirEntry::new(&child.name, child.kind, ino)?.encode(raw)?;
                    }
                    self.driver.write(self.data_offset(*block), &buf)?;
                }

                for &child in children {
                    self.sync_inode(child)?;
                }
            }
            InodeBody::File { blocks, data } => {
                for (&block, chunk) in blocks.iter().zip(data.chunks(block_size)) {
                    self.driver.write(self.data_offset(block), chunk)?;
                }
            }
        }

        Ok(())
    }
}

impl NewFs {
    fn loaded(&mut self, id: DentryId) -> Result<&Inode> {
        self.load(id)?;
        self.dentry(id)?.inode.as_ref().ok_or(Error::InvalidArgument)
    }

    fn loaded_mut(&mut self, id: DentryId) -> Result<&mut Inode> {
        self.load(id)?;
        self.dentries
            .get_mut(id)
            .and_then(|dentry| dentry.inode.as_mut())
            .ok_or(Error::InvalidArgument)
    }

    /// 已加载目录的数据块与子项
    fn dir_body(&mut self, id: DentryId) -> Result<(&mut Option<u32>, &mut Vec<DentryId>)> {
        let inode = self
            .dentries
            .get_mut(id)
            .and_then(|dentry| dentry.inode.as_mut())
            .ok_or(Error::InvalidArgument)?;
        match &mut inode.body {
            InodeBody::Directory { block, children } => Ok((block, children)),
            InodeBody::File { .. } => Err(Error::NotADirectory),
        }
    }
}

impl Dentries {
    pub(crate) fn insert(&mut self, dentry: Dentry) -> DentryId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.0] = Some(dentry);
                id
            }
            None => {
                self.slots.push(Some(dentry));
                DentryId(self.slots.len() - 1)
            }
        }
    }

    pub(crate) fn remove(&mut self, id: DentryId) -> Option<Dentry> {
        let dentry = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id);
        Some(dentry)
    }

    #[inline]
    pub(crate) fn get(&self, id: DentryId) -> Option<&Dentry> {
        self.slots.get(id.0)?.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: DentryId) -> Option<&mut Dentry> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    /// 表中存活的目录项个数
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// 名字非空、不含`/`，且放得进目录项记录
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(['/', '\0']) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

impl From<FileKind> for StatKind {
    #[inline]
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Directory => Self::DIR,
            FileKind::File => Self::FILE,
        }
    }
}

impl Stat {
    /// st_mode
    #[inline]
    pub fn mode(&self) -> u32 {
        self.kind as u32 | self.perm
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;

    use block_dev::{BlockDevice, DeviceError, Request};
    use spin::Mutex;

    use super::{Dentries, Dentry, Stat, StatKind};
    use crate::{DATA_PER_FILE, DEFAULT_PERM, Error, FileKind, NewFs};

    const IO_SIZE: usize = 512;

    struct Disk(Mutex<Vec<u8>>);

    impl BlockDevice for Disk {
        fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
            let data = self.0.lock();
            let start = block_id * IO_SIZE;
            let unit = data
                .get(start..start + IO_SIZE)
                .ok_or(DeviceError::Read { block_id })?;
            buf.copy_from_slice(unit);
            Ok(())
        }

        fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
            let mut data = self.0.lock();
            let start = block_id * IO_SIZE;
            data.get_mut(start..start + IO_SIZE)
                .ok_or(DeviceError::Write { block_id })?
                .copy_from_slice(buf);
            Ok(())
        }

        fn ioctl(&self, request: Request) -> Result<usize, DeviceError> {
            Ok(match request {
                Request::DiskSize => self.0.lock().len(),
                Request::IoSize => IO_SIZE,
            })
        }
    }

    #[test]
    fn file_blocks_rolled_back() {
        let mut fs = NewFs::mount(Arc::new(Disk(Mutex::new(vec![0; 4 << 20])))).unwrap();
        let root = fs.root();
        fs.create(root, "a", FileKind::File).unwrap();

        // 只留下不够一个文件的数据块
        while fs.data_bitmap.capacity() - fs.data_bitmap.count() > DATA_PER_FILE - 1 {
            fs.data_bitmap.alloc().unwrap();
        }
        let data_map = fs.data_bitmap.clone();
        let inode_map = fs.inode_bitmap.clone();
        let usage = fs.usage();

        assert_eq!(Err(Error::NoSpace), fs.create(root, "b", FileKind::File));
        assert_eq!(data_map, fs.data_bitmap);
        assert_eq!(inode_map, fs.inode_bitmap);
        assert_eq!(usage, fs.usage());
        assert_eq!(1, fs.children(root).unwrap().len());

        // 目录不需要数据块，仍能创建
        assert!(fs.create(root, "c", FileKind::Directory).is_ok());
    }

    #[test]
    fn slots_reused() {
        let mut dentries = Dentries::default();
        let root = dentries.insert(Dentry::root());
        let a = dentries.insert(Dentry::new("a", FileKind::File, Some(root)));
        let b = dentries.insert(Dentry::new("b", FileKind::File, Some(root)));
        assert_eq!(3, dentries.len());

        assert_eq!("a", dentries.remove(a).unwrap().name());
        assert!(dentries.get(a).is_none());
        assert!(dentries.remove(a).is_none());

        // 作废的编号被新目录项复用
        let c = dentries.insert(Dentry::new("c", FileKind::Directory, Some(root)));
        assert_eq!(a, c);
        assert_eq!(Some(root), dentries.get(c).unwrap().parent());
        assert_eq!("b", dentries.get(b).unwrap().name());
        assert_eq!(3, dentries.len());
    }

    #[test]
    fn root_dentry() {
        let root = Dentry::root();
        assert!(root.is_dir());
        assert!(!root.is_loaded());
        assert_eq!(Some(crate::ROOT_INO), root.ino());
        assert_eq!(None, root.parent());
    }

    #[test]
    fn mode() {
        assert_eq!(StatKind::DIR, FileKind::Directory.into());
        let stat = Stat {
            ino: 1,
            kind: FileKind::File.into(),
            perm: DEFAULT_PERM,
            size: 2,
            block_size: 1024,
            blocks: 6,
        };
        assert_eq!(0o100777, stat.mode());
    }
}
