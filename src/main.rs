use clap::Parser;
use detectforge::cli::{commands, Cli, Command};
use detectforge::config::Config;
use detectforge::utils::logging::init_logging;
use detectforge::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // 初始化日志
    init_logging(&config.logging)?;

    // 执行命令，如果没有指定命令则默认启动服务器
    match cli.command {
        None | Some(Command::Serve) => commands::serve(config).await?,
        Some(Command::List) => commands::list(&config).await?,
        Some(Command::Predict { image, threshold }) => {
            commands::predict(&config, &image, threshold).await?
        }
        Some(Command::Pull) => commands::pull(&config).await?,
    }

    Ok(())
}
