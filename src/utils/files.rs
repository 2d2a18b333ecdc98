//! 文件辅助函数

use crate::api::error::StorageError;
use crate::Result;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// 每次从文件尾部向前读取的块大小
const TAIL_CHUNK: u64 = 8 * 1024;

/// 读取文件最后 `lines` 行
///
/// 从文件末尾按块向前读取，读到足够的换行即停止，不会把整个文件读入内存。
/// 文件不存在时返回 None。
pub async fn tail_lines(path: &Path, lines: usize) -> Result<Option<String>> {
    let read_err =
        |e: std::io::Error| StorageError::ReadFailed(format!("{}: {}", path.display(), e));

    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(read_err(e).into()),
    };
    let mut pos = file.metadata().await.map_err(read_err)?.len();

    let mut buf: Vec<u8> = Vec::new();
    // 已读部分中的换行数，不计文件末尾的那一个
    let mut newlines = 0usize;
    while pos > 0 && lines > 0 && newlines < lines {
        let step = pos.min(TAIL_CHUNK);
        pos -= step;
        file.seek(SeekFrom::Start(pos)).await.map_err(read_err)?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk).await.map_err(read_err)?;

        newlines += chunk.iter().filter(|&&b| b == b'\n').count();
        if buf.is_empty() && chunk.last() == Some(&b'\n') {
            newlines -= 1;
        }
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    let mut tail = all[start..].join("\n");
    if !tail.is_empty() {
        tail.push('\n');
    }
    Ok(Some(tail))
}
