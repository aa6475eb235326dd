use anyhow::Result;
use gem_tally::utils::logging;
use gem_tally::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run().await?;

    if let Some(message) = summary.capture_error {
        anyhow::bail!("拍照流程未完成: {}", message);
    }

    Ok(())
}
