use color_eyre::eyre::Result;
use mimalloc::MiMalloc;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

mod command;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// ====== CLI 구조체 ======

#[derive(StructOpt, Debug)]
#[structopt(name = "chat-replay", about = "다시보기 채팅 리플레이")]
pub enum Opt {
    /// 가상 재생 시계에 맞춰 채팅을 리플레이
    #[structopt(name = "replay")]
    Replay(command::replay::ReplayOpt),

    /// 한 구간의 채팅을 한 번만 조회
    #[structopt(name = "inspect")]
    Inspect(command::inspect::InspectOpt),
}

/// ====== 엔트리포인트 ======

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();

    match opt {
        Opt::Replay(opts) => command::replay::run_replay(&opts).await?,
        Opt::Inspect(opts) => command::inspect::run_inspect(&opts).await?,
    }

    Ok(())
}
