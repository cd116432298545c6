use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voip_assist::{
    make_handler, AllowList, AudioTransport, CallHandler, CallInfo, Config, FileMediaSource,
    NatsPipeline, Pipeline, RtpTransport, Services, ToneBank,
};

/// Bridge one VoIP call's RTP audio to the voice assistant pipeline
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/voip-assist")]
    config: String,

    /// Caller's RTP endpoint
    #[arg(long)]
    remote: SocketAddr,

    /// SIP call id
    #[arg(long, default_value = "local-call")]
    call_id: String,

    /// Device the call is attributed to
    #[arg(long, default_value = "voip")]
    device_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let tones = match &cfg.tones.dir {
        Some(dir) => ToneBank::load(dir)?,
        None => {
            info!("No tone directory configured, using generated tones");
            ToneBank::generated()
        }
    };

    let pipeline: Option<Arc<dyn Pipeline>> =
        match NatsPipeline::connect(&cfg.pipeline.nats_url, cfg.event_timeout()).await {
            Ok(pipeline) => Some(Arc::new(pipeline)),
            Err(e) => {
                warn!("Pipeline unavailable: {:#}", e);
                None
            }
        };

    let services = Services {
        admission: Arc::new(AllowList::from_entries(&cfg.admission.allowed_callers)),
        pipeline,
        media: Arc::new(FileMediaSource::new(&cfg.media.root)),
        tones: Arc::new(tones),
        loop_delay: cfg.loop_delay(),
    };

    let transport = Arc::new(
        RtpTransport::bind(&cfg.rtp, args.remote)
            .await
            .context("Failed to set up RTP")?,
    );

    let call = CallInfo {
        call_id: args.call_id,
        caller: args.remote,
        device_id: args.device_id,
    };

    let handler = make_handler(
        call,
        &services,
        cfg.session_config(),
        Arc::clone(&transport) as Arc<dyn AudioTransport>,
    );
    let receiver = transport.spawn_receiver(handler.chunk_handler());

    info!("Listening for RTP on {}", transport.local_addr()?);

    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = poll.tick() => {
                if transport.is_closed() {
                    info!("Call ended");
                    break;
                }
            }
        }
    }

    match &handler {
        CallHandler::Session(session) => {
            session.disconnect();
            info!("Session stats: {}", serde_json::to_string(&session.stats())?);
        }
        CallHandler::PreRecorded(_) => transport.close(),
    }

    receiver.abort();
    Ok(())
}
