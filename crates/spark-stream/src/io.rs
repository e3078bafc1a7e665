//! 外部数据源与数据汇的适配层。
//!
//! 核心协议只依赖 [`ItemSource`] 与 [`ItemSink`] 两个阻塞、顺序的接口；
//! [`ReadSource`] 与 [`WriteSink`] 把任意 [`Read`]/[`Write`] 设备包装成逐字节的源与汇。

use std::io::{self, BufReader, BufWriter, Read, Write};

/// 顺序产出数据项的阻塞源。
pub trait ItemSource: Send {
    type Item: Send;

    /// 拉取下一个数据项；`Ok(None)` 表示数据已耗尽。
    fn pull(&mut self) -> io::Result<Option<Self::Item>>;

    /// 释放底层资源。释放后再次拉取应返回 `Ok(None)`。
    fn release(&mut self) -> io::Result<()>;
}

/// 逐项接收数据的阻塞汇。
pub trait ItemSink: Send {
    type Item: Send;

    fn push(&mut self, item: Self::Item) -> io::Result<()>;

    /// 刷新并释放底层资源。
    fn release(&mut self) -> io::Result<()>;
}

/// 以 [`Read`] 设备为后端的字节源。
///
/// - 每次 `pull` 读取一个字节，遇到 [`io::ErrorKind::Interrupted`] 自动重试；
/// - `release` 丢弃底层读取器（关闭文件描述符等由其 `Drop` 完成）。
#[derive(Debug)]
pub struct ReadSource<R> {
    reader: Option<R>,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    /// 是否仍持有底层读取器。
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

impl<R: Read> ReadSource<BufReader<R>> {
    /// 使用指定容量的 [`BufReader`] 包装读取器，避免逐字节系统调用。
    pub fn buffered(reader: R, capacity: usize) -> Self {
        Self::new(BufReader::with_capacity(capacity, reader))
    }
}

impl<R: Read + Send> ItemSource for ReadSource<R> {
    type Item = u8;

    fn pull(&mut self) -> io::Result<Option<u8>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    fn release(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// 以 [`Write`] 设备为后端的字节汇。
///
/// `release` 先 `flush` 再丢弃写入器；`flush` 失败时写入器同样被丢弃，错误原样返回。
#[derive(Debug)]
pub struct WriteSink<W> {
    writer: Option<W>,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl<W: Write> WriteSink<BufWriter<W>> {
    pub fn buffered(writer: W, capacity: usize) -> Self {
        Self::new(BufWriter::with_capacity(capacity, writer))
    }
}

impl<W: Write + Send> ItemSink for WriteSink<W> {
    type Item = u8;

    fn push(&mut self, item: u8) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(&[item]),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write sink already released",
            )),
        }
    }

    fn release(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}
