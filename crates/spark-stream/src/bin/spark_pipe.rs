//! `spark-pipe`：通过背压协议把输入逐字节搬运到输出。
//!
//! # 使用方法
//! ```bash
//! cargo run --bin spark-pipe -- --config pipe.toml --input in.bin --output out.bin
//! ```
//! - `--config`：可选，TOML 配置文件（见 `spark_stream::config`）；
//! - `--input` / `--output`：可选，覆盖配置中的路径；均缺省时在 stdin 与 stdout 之间搬运。
//!
//! 日志写入 stderr，`RUST_LOG` 优先于配置中的 `log_filter`。

use std::{
    env,
    fs::File,
    io::{self, Read, Write},
    path::PathBuf,
    sync::Arc,
};

use spark_stream::{
    Outcome, Publisher, ReadSource, SinkSubscriber, SourcePublisher, WriteSink,
    config::PipeConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("spark-pipe: {error}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl Args {
    /// 命令行给出的路径覆盖配置文件中的同名项。
    fn apply_to(self, config: &mut PipeConfig) {
        if self.input.is_some() {
            config.input = self.input;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
    }
}

fn run() -> Result<(), String> {
    let args = parse_args(env::args().skip(1))?;
    let mut config = match &args.config {
        Some(path) => PipeConfig::load(path).map_err(|error| error.to_string())?,
        None => PipeConfig::default(),
    };
    args.apply_to(&mut config);

    init_logging(&config.log_filter);

    let input = config.input.clone();
    let read_buffer = config.read_buffer;
    let publisher = SourcePublisher::new(move || -> io::Result<_> {
        let reader: Box<dyn Read + Send> = match &input {
            Some(path) => Box::new(File::open(path)?),
            None => Box::new(io::stdin()),
        };
        Ok(ReadSource::buffered(reader, read_buffer))
    });

    let writer: Box<dyn Write + Send> = match &config.output {
        Some(path) => Box::new(
            File::create(path)
                .map_err(|error| format!("failed to create `{}`: {error}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    let subscriber = Arc::new(SinkSubscriber::new(WriteSink::buffered(
        writer,
        config.write_buffer,
    )));

    // 订阅者在 `on_subscribe` 内请求无界需求，排空在当前线程同步完成。
    publisher.subscribe(subscriber.clone());

    match subscriber.outcome() {
        Some(Outcome::Completed) => {
            info!(bytes = subscriber.items_written(), "pipe finished");
            Ok(())
        }
        Some(outcome) => Err(outcome
            .error()
            .map(ToString::to_string)
            .unwrap_or_else(|| "stream failed".to_owned())),
        None => Err("stream did not reach a terminal state".to_owned()),
    }
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    let mut raw = raw;
    while let Some(flag) = raw.next() {
        let slot = match flag.as_str() {
            "--config" => &mut args.config,
            "--input" => &mut args.input,
            "--output" => &mut args.output,
            "-h" | "--help" => return Err(usage("")),
            unknown => return Err(usage(&format!("unknown argument: {unknown}"))),
        };
        let value = raw
            .next()
            .ok_or_else(|| usage(&format!("{flag} requires a file path")))?;
        *slot = Some(PathBuf::from(value));
    }
    Ok(args)
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // 宿主若已安装全局 Subscriber，沿用之即可。
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn usage(detail: &str) -> String {
    format!(
        "{detail}\nusage: spark-pipe [--config pipe.toml] [--input in.bin] [--output out.bin]"
    )
}
