use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::cli::SubCommandExtend;
use crate::config::{DuplicateOptions, ServiceOptions};
use crate::upload::UploadPolicy;
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
    // 请求未指定阈值时使用的默认值
    #[command(flatten)]
    pub duplicate: DuplicateOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 单个上传文件的最大字节数
    #[arg(long, value_name = "BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_file_size: usize,
    /// 单次请求的最大字节数
    #[arg(long, value_name = "BYTES", default_value_t = 256 * 1024 * 1024)]
    pub max_body_size: usize,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let service = self.service.open(opts)?;
        let upload = UploadPolicy { max_size: self.max_file_size, ..Default::default() };

        // 创建应用状态
        let state = server::AppState::new(service, upload, self.duplicate.threshold);

        // 创建应用
        let app = server::create_app(state, self.max_body_size);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
