mod cli;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use newfs::{DentryId, FileKind, MAGIC, NewFs, StatKind};
use newfs_fuse::{BlockFile, SECTOR_SIZE};
use typed_bytesize::ByteSizeIec;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    println!("image={:?}", cli.image);

    match cli.command {
        Command::Format { size } => format(&cli.image, size),
        Command::Pack { source, target } => {
            with_fs(&cli.image, |fs| pack(fs, &source, &target))
        }
        Command::Ls { path } => {
            with_fs(&cli.image, |fs| ls(fs, &path, &mut io::stdout().lock()))
        }
        Command::Cat { path } => {
            with_fs(&cli.image, |fs| cat(fs, &path, &mut io::stdout().lock()))
        }
    }
}

fn format(image: &Path, size: u64) -> io::Result<()> {
    let disk_size = ByteSizeIec::mib(size).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(disk_size)?;

    let mut fs = NewFs::mount(Arc::new(BlockFile::new(fd, SECTOR_SIZE))).map_err(fs_error)?;
    log::info!(
        "formatted {disk_size} bytes: {} inodes, {} data blocks of {} bytes",
        fs.super_block().max_ino,
        fs.data_bitmap().capacity(),
        fs.block_size()
    );
    fs.unmount().map_err(fs_error)
}

/// 把宿主机目录`source`下的一切复制到镜像的`target`目录下
fn pack(fs: &mut NewFs, source: &Path, target: &str) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| io::Error::other(format!("{name:?} isn't valid UTF-8")))?;
        let path = format!("{}/{name}", target.trim_end_matches('/'));

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            match fs.mknod(&path, FileKind::Directory) {
                Ok(_) | Err(newfs::Error::Exists) => {}
                Err(err) => return Err(fs_error(err)),
            }
            pack(fs, &entry.path(), &path)?;
        } else if file_type.is_file() {
            let data = fs::read(entry.path())?;
            let file = fs.mknod(&path, FileKind::File).map_err(fs_error)?;
            fs.write_file(file, 0, &data).map_err(fs_error)?;
            log::info!("packed {path:?} ({} bytes)", data.len());
        } else {
            log::warn!("skipping {:?}", entry.path());
        }
    }

    Ok(())
}

fn ls(fs: &mut NewFs, path: &str, out: &mut impl Write) -> io::Result<()> {
    let target = resolve(fs, path)?;
    let entries = if fs.dentry(target).map_err(fs_error)?.is_dir() {
        fs.children(target).map_err(fs_error)?.to_vec()
    } else {
        vec![target]
    };

    for dentry in entries {
        let stat = fs.stat(dentry).map_err(fs_error)?;
        let kind = if stat.kind == StatKind::DIR { 'd' } else { '-' };
        let name = fs.dentry(dentry).map_err(fs_error)?.name();
        writeln!(out, "{kind} {:>5} {:>8} {name}", stat.ino, stat.size)?;
    }

    Ok(())
}

fn cat(fs: &mut NewFs, path: &str, out: &mut impl Write) -> io::Result<()> {
    let file = resolve(fs, path)?;
    let size = fs.stat(file).map_err(fs_error)?.size as usize;
    let mut data = vec![0; size];
    let len = fs.read_file(file, 0, &mut data).map_err(fs_error)?;
    out.write_all(&data[..len])
}

/// 挂载已有的镜像，执行`op`后卸载
fn with_fs(image: &Path, op: impl FnOnce(&mut NewFs) -> io::Result<()>) -> io::Result<()> {
    // 魔数不对时挂载会格式化整个镜像
    let mut magic = [0u8; 4];
    File::open(image)?.read_exact(&mut magic)?;
    if u32::from_le_bytes(magic) != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{image:?} isn't a newfs image"),
        ));
    }

    let mut fs = NewFs::mount(Arc::new(BlockFile::open(image)?)).map_err(fs_error)?;
    let result = op(&mut fs);
    fs.unmount().map_err(fs_error)?;
    result
}

fn resolve(fs: &mut NewFs, path: &str) -> io::Result<DentryId> {
    let lookup = fs.lookup(path).map_err(fs_error)?;
    if !lookup.found {
        return Err(fs_error(newfs::Error::NotFound));
    }
    Ok(lookup.dentry)
}

fn fs_error(err: newfs::Error) -> io::Error {
    log::error!("{err}");
    io::Error::from_raw_os_error(err.errno())
}
