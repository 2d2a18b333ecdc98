pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// detectforge CLI
#[derive(Parser)]
#[command(name = "detectforge")]
#[command(about = "Object-detection inference server with checkpoint lifecycle and registry sync")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径（TOML）；环境变量 DETECTFORGE__* 覆盖其中的值
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI 命令
#[derive(Subcommand)]
pub enum Command {
    /// 启动服务器（默认）
    Serve,
    /// 列出本地检查点
    List,
    /// 用最新的本地检查点对一张图像做预测
    Predict {
        /// 图像路径
        image: PathBuf,
        /// 置信度阈值，默认取配置值
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// 将仓库生产版本落地到检查点目录
    Pull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from(["detectforge"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["detectforge", "predict", "dog.jpg", "--threshold", "0.3", "-c", "app.toml"]);
        assert_eq!(cli.config.as_deref(), Some("app.toml"));
        match cli.command {
            Some(Command::Predict { image, threshold }) => {
                assert_eq!(image, PathBuf::from("dog.jpg"));
                assert_eq!(threshold, Some(0.3));
            }
            _ => panic!("expected predict"),
        }
    }
}
