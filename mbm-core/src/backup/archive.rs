// 产物归档辅助
//
// 压缩和打包都是CPU密集的阻塞操作，统一放到 spawn_blocking 中执行。

use crate::{MbmError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// gzip 压缩单个文件
pub async fn gzip_file(src: &Path, dst: &Path) -> Result<()> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let mut input = File::open(&src)?;
        let output = File::create(&dst)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;
        Ok::<(), MbmError>(())
    })
    .await??;
    Ok(())
}

/// zip 压缩单个文件
pub async fn zip_file(src: &Path, dst: &Path) -> Result<()> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let name = src
            .file_name()
            .ok_or_else(|| MbmError::custom("无法获取源文件名"))?
            .to_string_lossy()
            .to_string();

        let mut input = File::open(&src)?;
        let output = File::create(&dst)?;
        let mut writer = zip::ZipWriter::new(output);

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);
        writer.start_file(name, options)?;
        io::copy(&mut input, &mut writer)?;
        writer.finish()?;
        Ok::<(), MbmError>(())
    })
    .await??;
    Ok(())
}

/// 将目录打包成 tar 文件（不压缩）
pub async fn tar_dir(src_dir: &Path, dst: &Path) -> Result<()> {
    let (src_dir, dst) = (src_dir.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let output = File::create(&dst)?;
        let mut builder = tar::Builder::new(output);
        append_dir_entries(&mut builder, &src_dir)?;
        builder.into_inner()?;
        Ok::<(), MbmError>(())
    })
    .await??;
    Ok(())
}

/// 将目录打包成 tar.gz 文件
pub async fn tar_gz_dir(src_dir: &Path, dst: &Path) -> Result<()> {
    let (src_dir, dst) = (src_dir.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let output = File::create(&dst)?;
        let encoder = GzEncoder::new(output, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        append_dir_entries(&mut builder, &src_dir)?;
        let encoder = builder.into_inner()?;
        encoder.finish()?;
        Ok::<(), MbmError>(())
    })
    .await??;
    Ok(())
}

/// 将目录打包成 zip 文件
pub async fn zip_dir(src_dir: &Path, dst: &Path) -> Result<()> {
    let (src_dir, dst) = (src_dir.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let output = File::create(&dst)?;
        let mut writer = zip::ZipWriter::new(output);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);

        for entry in WalkDir::new(&src_dir) {
            let entry = entry?;
            let path = entry.path();
            if path == src_dir {
                continue;
            }

            // 归档内部统一使用 Unix 风格分隔符
            let relative = relative_name(&src_dir, path)?;

            if path.is_dir() {
                writer.add_directory(format!("{relative}/"), options)?;
            } else {
                writer.start_file(relative, options)?;
                let mut input = File::open(path)?;
                io::copy(&mut input, &mut writer)?;
            }
        }

        writer.finish()?;
        Ok::<(), MbmError>(())
    })
    .await??;
    Ok(())
}

/// 将目录下所有文件写入 tar 归档，保留相对路径
fn append_dir_entries<W: io::Write>(builder: &mut tar::Builder<W>, src_dir: &PathBuf) -> Result<()> {
    for entry in WalkDir::new(src_dir) {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let relative = relative_name(src_dir, path)?;
        builder.append_path_with_name(path, relative)?;
    }
    Ok(())
}

fn relative_name(base: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base)?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sql"), "create table a;").unwrap();
        fs::create_dir(dir.path().join("meta")).unwrap();
        fs::write(dir.path().join("meta").join("b.sql"), "create table b;").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_gzip_file_writes_gzip_magic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("backup.sql");
        fs::write(&src, "select 1;").unwrap();

        let dst = dir.path().join("backup.sql.gz");
        gzip_file(&src, &dst).await.unwrap();

        let bytes = fs::read(&dst).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_zip_file_writes_zip_magic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("backup.sql");
        fs::write(&src, "select 1;").unwrap();

        let dst = dir.path().join("backup.sql.zip");
        zip_file(&src, &dst).await.unwrap();

        let bytes = fs::read(&dst).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn test_dir_archives_produce_single_file() {
        let src = sample_dir();
        let out = tempfile::tempdir().unwrap();

        let tar_path = out.path().join("backup.tar");
        tar_dir(src.path(), &tar_path).await.unwrap();
        assert!(tar_path.is_file());
        assert!(fs::metadata(&tar_path).unwrap().len() > 0);

        let tgz_path = out.path().join("backup.tar.gz");
        tar_gz_dir(src.path(), &tgz_path).await.unwrap();
        let bytes = fs::read(&tgz_path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

        let zip_path = out.path().join("backup.zip");
        zip_dir(src.path(), &zip_path).await.unwrap();
        let bytes = fs::read(&zip_path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
