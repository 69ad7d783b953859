mod common;

use common::{RamDisk, init_logger};
use newfs::{DATA_PER_FILE, DirEntry, Error, FileKind, NewFs, StatKind};

/// 1 KiB 的块，一个目录最多 7 个目录项
const DISK: usize = 4 << 20;
const IO_SIZE: usize = 512;

fn mount() -> NewFs {
    init_logger();
    NewFs::mount(RamDisk::new(DISK, IO_SIZE)).unwrap()
}

#[test]
fn directory_capacity() {
    let mut fs = mount();
    let root = fs.root();
    let per_block = fs.block_size() / DirEntry::SIZE;
    assert_eq!(7, per_block);

    for i in 0..per_block {
        fs.create(root, &format!("f{i}"), FileKind::File).unwrap();
    }
    let inodes = fs.inode_bitmap().count();
    let usage = fs.usage();

    assert_eq!(
        Err(Error::NoSpace),
        fs.create(root, "one-too-many", FileKind::File)
    );
    assert_eq!(per_block, fs.children(root).unwrap().len());
    assert_eq!(inodes, fs.inode_bitmap().count());
    assert_eq!(usage, fs.usage());
    assert!(!fs.lookup("/one-too-many").unwrap().found);

    // 子目录同样受限
    let sub = fs.mknod("/f0-dir", FileKind::Directory);
    assert_eq!(Err(Error::NoSpace), sub);
}

#[test]
fn create_errors() {
    let mut fs = mount();
    let root = fs.root();
    let file = fs.create(root, "file", FileKind::File).unwrap();

    assert_eq!(Err(Error::Exists), fs.create(root, "file", FileKind::Directory));
    assert_eq!(
        Err(Error::NotADirectory),
        fs.create(file, "child", FileKind::File)
    );
    assert_eq!(Err(Error::InvalidArgument), fs.create(root, "", FileKind::File));
    assert_eq!(Err(Error::InvalidArgument), fs.create(root, "a/b", FileKind::File));
    assert_eq!(Err(Error::InvalidArgument), fs.create(root, "a\0b", FileKind::File));
    assert_eq!(
        Some(Error::InvalidArgument),
        fs.mknod("/a\0b", FileKind::Directory).err()
    );
    let long = "x".repeat(129);
    assert_eq!(Err(Error::InvalidArgument), fs.create(root, &long, FileKind::File));
    assert!(fs.create(root, &"x".repeat(128), FileKind::File).is_ok());
}

#[test]
fn directory_block_follows_children() {
    let mut fs = mount();
    let root = fs.root();
    assert_eq!(0, fs.stat(root).unwrap().blocks);

    let dir = fs.create(root, "dir", FileKind::Directory).unwrap();
    assert_eq!(1, fs.stat(root).unwrap().blocks);
    assert_eq!(0, fs.stat(dir).unwrap().blocks);
    assert_eq!(1, fs.data_bitmap().count());
    assert_eq!(fs.block_size(), fs.usage());

    let file = fs.create(dir, "file", FileKind::File).unwrap();
    assert_eq!(1, fs.stat(dir).unwrap().blocks);
    assert_eq!(2 + DATA_PER_FILE, fs.data_bitmap().count());

    fs.drop_inode(file).unwrap();
    fs.remove_entry(dir, file).unwrap();
    assert_eq!(0, fs.stat(dir).unwrap().blocks);
    assert_eq!(1, fs.data_bitmap().count());
    assert_eq!(fs.block_size(), fs.usage());
}

#[test]
fn remove_missing_entry() {
    let mut fs = mount();
    let root = fs.root();
    let dir = fs.create(root, "dir", FileKind::Directory).unwrap();
    let file = fs.create(root, "file", FileKind::File).unwrap();
    assert_eq!(Err(Error::NotFound), fs.remove_entry(dir, file));

    fs.remove_entry(root, file).unwrap();
    // 作废的编号
    assert_eq!(Some(Error::InvalidArgument), fs.dentry(file).err());
}

#[test]
fn recursive_drop() {
    init_logger();
    let disk = RamDisk::new(DISK, IO_SIZE);
    let mut fs = NewFs::mount(disk.clone()).unwrap();
    let inodes = fs.inode_bitmap().count();
    let blocks = fs.data_bitmap().count();
    let usage = fs.usage();

    let root = fs.root();
    let d = fs.create(root, "d", FileKind::Directory).unwrap();
    let f1 = fs.create(d, "f1", FileKind::File).unwrap();
    fs.write_file(f1, 0, b"one").unwrap();
    let sub = fs.create(d, "sub", FileKind::Directory).unwrap();
    fs.create(sub, "f2", FileKind::File).unwrap();
    fs.create(sub, "subsub", FileKind::Directory).unwrap();
    fs.unmount().unwrap();

    // 重新挂载，子树处在未加载的状态
    let mut fs = NewFs::mount(disk.reopen()).unwrap();
    let mut inos = Vec::new();
    for path in ["/d", "/d/f1", "/d/sub", "/d/sub/f2", "/d/sub/subsub"] {
        let lookup = fs.lookup(path).unwrap();
        assert!(lookup.found);
        inos.push(fs.dentry(lookup.dentry).unwrap().ino().unwrap());
    }
    for &ino in &inos {
        assert!(fs.inode_bitmap().is_set(ino));
    }

    let mut fs = NewFs::mount(disk.reopen()).unwrap();
    let root = fs.root();
    let d = fs.readdir(root, 0).unwrap().unwrap();
    assert!(!fs.dentry(d).unwrap().is_loaded());
    fs.drop_inode(d).unwrap();
    fs.remove_entry(root, d).unwrap();

    for ino in inos {
        assert!(!fs.inode_bitmap().is_set(ino));
    }
    assert_eq!(inodes, fs.inode_bitmap().count());
    assert_eq!(blocks, fs.data_bitmap().count());
    assert_eq!(usage, fs.usage());
    assert!(!fs.lookup("/d").unwrap().found);
}

#[test]
fn root_never_dropped() {
    let mut fs = mount();
    let root = fs.root();
    fs.create(root, "a", FileKind::Directory).unwrap();
    assert_eq!(Err(Error::InvalidArgument), fs.drop_inode(root));
    assert_eq!(Err(Error::InvalidArgument), fs.rmdir("/"));
    assert!(fs.lookup("/a").unwrap().found);
}

#[test]
fn readdir_in_creation_order() {
    let disk = RamDisk::new(DISK, IO_SIZE);
    let mut fs = NewFs::mount(disk.clone()).unwrap();
    let root = fs.root();
    for name in ["x", "y", "z"] {
        fs.create(root, name, FileKind::File).unwrap();
    }
    fs.unmount().unwrap();

    let mut fs = NewFs::mount(disk.reopen()).unwrap();
    let root = fs.root();
    let mut names = Vec::new();
    let mut index = 0;
    while let Some(child) = fs.readdir(root, index).unwrap() {
        names.push(fs.dentry(child).unwrap().name().to_owned());
        index += 1;
    }
    assert_eq!(vec!["x", "y", "z"], names);

    let x = fs.readdir(root, 0).unwrap().unwrap();
    assert_eq!(Err(Error::NotADirectory), fs.readdir(x, 0));
}

#[test]
fn stat() {
    let mut fs = mount();
    let root = fs.root();
    let file = fs.create(root, "file", FileKind::File).unwrap();
    fs.create(root, "dir", FileKind::Directory).unwrap();
    fs.write_file(file, 0, b"hi").unwrap();

    let stat = fs.stat(file).unwrap();
    assert_eq!(StatKind::FILE, stat.kind);
    assert_eq!(0o100777, stat.mode());
    assert_eq!(2, stat.size);
    assert_eq!(DATA_PER_FILE as u64, stat.blocks);
    assert_eq!(1024, stat.block_size);

    let stat = fs.stat(root).unwrap();
    assert_eq!(StatKind::DIR, stat.kind);
    assert_eq!(0, stat.ino);
    assert_eq!(2 * DirEntry::SIZE as u64, stat.size);
}

#[test]
fn file_capacity() {
    let mut fs = mount();
    let root = fs.root();
    let file = fs.create(root, "file", FileKind::File).unwrap();
    let capacity = DATA_PER_FILE * fs.block_size();

    assert_eq!(Err(Error::NoSpace), fs.write_file(file, capacity - 1, b"ab"));
    assert_eq!(Ok(1), fs.write_file(file, capacity - 1, b"a"));
    assert_eq!(capacity as u64, fs.stat(file).unwrap().size);

    // 跨块读写
    let data: Vec<u8> = (0..3000).map(|i| i as u8).collect();
    fs.write_file(file, 1000, &data).unwrap();
    let mut buf = vec![0; 3000];
    assert_eq!(Ok(3000), fs.read_file(file, 1000, &mut buf));
    assert_eq!(data, buf);

    // 读到文件末尾为止
    let mut buf = [0u8; 8];
    assert_eq!(Ok(1), fs.read_file(file, capacity - 1, &mut buf));
    assert_eq!(Ok(0), fs.read_file(file, capacity, &mut buf));

    // 偏移加长度溢出
    assert_eq!(Ok(0), fs.read_file(file, usize::MAX, &mut buf));
    assert_eq!(Err(Error::NoSpace), fs.write_file(file, usize::MAX, b"ab"));
    assert_eq!(capacity as u64, fs.stat(file).unwrap().size);
}

#[test]
fn truncate() {
    let mut fs = mount();
    let root = fs.root();
    let file = fs.create(root, "file", FileKind::File).unwrap();
    fs.write_file(file, 0, b"hello").unwrap();

    fs.truncate(file, 2).unwrap();
    let mut buf = [0xFFu8; 8];
    assert_eq!(Ok(2), fs.read_file(file, 0, &mut buf));
    assert_eq!(b"he", &buf[..2]);

    fs.truncate(file, 4).unwrap();
    assert_eq!(Ok(4), fs.read_file(file, 0, &mut buf));
    assert_eq!(b"he\0\0", &buf[..4]);

    let too_big = DATA_PER_FILE * fs.block_size() + 1;
    assert_eq!(Err(Error::NoSpace), fs.truncate(file, too_big));
    assert_eq!(Err(Error::IsADirectory), fs.truncate(root, 0));
}

#[test]
fn directory_is_not_a_file() {
    let mut fs = mount();
    let root = fs.root();
    let mut buf = [0u8; 4];
    assert_eq!(Err(Error::IsADirectory), fs.read_file(root, 0, &mut buf));
    assert_eq!(Err(Error::IsADirectory), fs.write_file(root, 0, b"data"));
}

#[test]
fn out_of_inodes() {
    init_logger();
    // 4 KiB 的块，共 64 块：只有 6 个 inode
    let mut fs = NewFs::mount(RamDisk::new(64 * 4096, 2048)).unwrap();
    let root = fs.root();
    for i in 0..5 {
        fs.create(root, &format!("f{i}"), FileKind::File).unwrap();
    }
    let blocks = fs.data_bitmap().count();

    assert_eq!(Err(Error::NoSpace), fs.create(root, "f5", FileKind::File));
    assert_eq!(5, fs.children(root).unwrap().len());
    assert_eq!(blocks, fs.data_bitmap().count());

    // 释放一个之后又能建了，且复用最小的编号
    let f2 = fs.lookup("/f2").unwrap().dentry;
    let ino = fs.dentry(f2).unwrap().ino();
    fs.unlink("/f2").unwrap();
    let f5 = fs.create(root, "f5", FileKind::File).unwrap();
    assert_eq!(ino, fs.dentry(f5).unwrap().ino());
}
