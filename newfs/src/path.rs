//! # 路径解析层
//!
//! 路径一律从根目录起算，以`/`分隔，空的分量（连续或结尾的`/`）忽略。
//! 名字按全长精确比较。

use crate::vfs::check_name;
use crate::{DentryId, Error, FileKind, NewFs, Result};

/// 路径解析的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// 找到时是目标本身，否则是走到的最后一级：
    /// 缺少分量的目录，或是中途挡住去路的文件
    pub dentry: DentryId,
    pub found: bool,
    /// 路径就是根目录
    pub is_root: bool,
}

impl NewFs {
    /// 逐级解析`path`。返回的目录项已经加载。
    pub fn lookup(&mut self, path: &str) -> Result<Lookup> {
        let mut current = self.root;
        let mut cmps = path.split('/').filter(|cmp| !cmp.is_empty()).peekable();
        if cmps.peek().is_none() {
            self.load(current)?;
            return Ok(Lookup {
                dentry: current,
                found: true,
                is_root: true,
            });
        }

        for cmp in cmps {
            self.load(current)?;
            let Some(next) = self.find_child(current, cmp)? else {
                log::trace!("{path:?}: {cmp:?} not found");
                return Ok(Lookup {
                    dentry: current,
                    found: false,
                    is_root: false,
                });
            };
            current = next;
        }

        self.load(current)?;
        Ok(Lookup {
            dentry: current,
            found: true,
            is_root: false,
        })
    }

    /// 在`path`处新建文件或目录，父目录必须已存在
    pub fn mknod(&mut self, path: &str, kind: FileKind) -> Result<DentryId> {
        let (parent, name) = split_path(path).ok_or(Error::Exists)?;
        let parent = self.lookup_dir(parent)?;
        self.create(parent, name, kind)
    }

    /// 删除文件
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let target = self.lookup_existing(path)?;
        if self.dentry(target)?.is_dir() {
            return Err(Error::IsADirectory);
        }
        self.remove(target)
    }

    /// 删除目录及其下的一切
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let target = self.lookup_existing(path)?;
        if target == self.root {
            return Err(Error::InvalidArgument);
        }
        if !self.dentry(target)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        self.remove(target)
    }

    /// 把`from`移到`to`，`to`不能已存在
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let source = self.lookup_existing(from)?;
        if source == self.root {
            return Err(Error::InvalidArgument);
        }

        let (parent, name) = split_path(to).ok_or(Error::Exists)?;
        check_name(name)?;
        let parent = self.lookup_dir(parent)?;
        match self.find_child(parent, name)? {
            Some(existing) if existing == source => return Ok(()),
            Some(_) => return Err(Error::Exists),
            None => {}
        }

        // 目录不能搬进自己的子树
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == source {
                return Err(Error::InvalidArgument);
            }
            ancestor = self.dentry(id)?.parent();
        }

        self.move_entry(source, parent, name)?;
        log::debug!("renamed {from:?} to {to:?}");
        Ok(())
    }
}

impl NewFs {
    /// 已加载目录`dir`下名为`name`的子项
    fn find_child(&self, dir: DentryId, name: &str) -> Result<Option<DentryId>> {
        let Some(children) = self.dentry(dir)?.children() else {
            return Ok(None);
        };

        Ok(children
            .iter()
            .copied()
            .find(|&child| self.dentries.get(child).is_some_and(|d| d.name() == name)))
    }

    fn lookup_existing(&mut self, path: &str) -> Result<DentryId> {
        let lookup = self.lookup(path)?;
        if !lookup.found {
            return Err(Error::NotFound);
        }
        Ok(lookup.dentry)
    }

    fn lookup_dir(&mut self, path: &str) -> Result<DentryId> {
        let lookup = self.lookup(path)?;
        if !self.dentry(lookup.dentry)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !lookup.found {
            return Err(Error::NotFound);
        }
        Ok(lookup.dentry)
    }

    fn remove(&mut self, target: DentryId) -> Result<()> {
        let parent = self.dentry(target)?.parent().ok_or(Error::InvalidArgument)?;
        self.drop_inode(target)?;
        self.remove_entry(parent, target)
    }
}

/// 拆成（父目录路径，最后一个分量），根目录返回`None`
fn split_path(path: &str) -> Option<(&str, &str)> {
    let path = path.trim_end_matches('/');
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    (!name.is_empty()).then_some((parent, name))
}
