use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Server};
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::broker::{CredentialBroker, CredentialCache, StsIdentityProvider};
use crate::commands::ServeCommand;
use crate::common::config::user_cache_dir;
use crate::common::{ConfigResolver, FileConfigResolver};
use platform::{NetworkPlatform, UnmanagedPlatform};
use service::MetadataService;

mod error;
mod handlers;
mod page;
mod platform;
mod service;

/// Link-local address SDKs query for instance credentials
pub const EC2_METADATA_IP: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

pub const CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
pub const TOKEN_PATH: &str = "/latest/api/token";
pub const PROFILE_PATH: &str = "/profile";
pub const MFA_PATH: &str = "/mfa";
pub const LIST_ROLES_PATH: &str = "/list-roles";
pub const REFRESH_PATH: &str = "/refresh";

pub const MFA_READ_LIMIT: usize = 64;
pub const PROFILE_READ_LIMIT: usize = 4096;

pub async fn run(args: ServeCommand) -> Result<()> {
    let resolver: Arc<dyn ConfigResolver> =
        Arc::new(FileConfigResolver::from_path_or_default(args.config.clone()));

    let cache = if args.no_cache {
        None
    } else {
        args.cache_dir.clone().or_else(user_cache_dir).map(CredentialCache::new)
    };
    match &cache {
        Some(cache) => info!("📁 Caching session credentials in {}", cache.dir().display()),
        None => warn!("Session credential caching is disabled"),
    }

    let broker = Arc::new(CredentialBroker::new(
        Arc::new(StsIdentityProvider::new()),
        resolver.clone(),
        cache,
    ));

    let platform: Box<dyn NetworkPlatform> = if args.skip_network_setup {
        Box::new(UnmanagedPlatform)
    } else {
        platform::native()
    };

    platform
        .raise_capabilities()
        .context("Failed to raise process capabilities")?;
    if !args.skip_network_setup {
        platform::setup_address(platform.as_ref(), args.bind_address).await?;
    }

    let addr = SocketAddr::from((args.bind_address, args.port));
    let listener =
        TcpListener::bind(addr).with_context(|| format!("Error creating listener on {}", addr))?;
    listener.set_nonblocking(true)?;

    platform
        .drop_privileges()
        .context("Failed to drop privileges, refusing to continue")?;

    let service = MetadataService::new(broker, resolver);

    let svc = service.clone();
    let make_svc = make_service_fn(move |_conn| {
        let service = svc.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let service = service.clone();
                async move { service.handle_request(req).await }
            }))
        }
    });
    let server = Server::from_tcp(listener)?.serve(make_svc);

    if let Some(profile) = &args.profile {
        activate_profile(&service, profile).await;
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, waiting for in-flight requests");
        let _ = shutdown_tx.send(());
    });

    println!("✅ Metadata service started");
    println!();
    println!("🎯 Endpoints:");
    println!("   🌐 Role selector:  http://{}/", addr);
    println!("   🔑 Credentials:    http://{}{}", addr, CREDENTIALS_PATH);
    println!();

    let result = server
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await;

    if platform.is_privileged() {
        if let Err(e) = platform.remove_address(args.bind_address).await {
            debug!("Failed to remove {}: {:#}", args.bind_address, e);
        }
    }

    if let Err(e) = &result {
        error!("Metadata server error: {}", e);
    }
    result.context("Metadata server exited with an error")
}

/// Select a profile through the regular `/profile` handler
async fn activate_profile(service: &MetadataService, profile: &str) {
    let req = match Request::builder()
        .method(Method::POST)
        .uri(PROFILE_PATH)
        .body(Body::from(profile.to_string()))
    {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to build profile request: {}", e);
            return;
        }
    };

    match service.handle_request(req).await {
        Ok(response) if response.status().is_success() => {
            info!("Activated initial profile '{}'", profile)
        }
        Ok(response) => warn!(
            "Initial profile '{}' not activated ({}), select it from the role page",
            profile,
            response.status()
        ),
        Err(never) => match never {},
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install ctrl-c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    _ = term.recv() => {},
                    _ = quit.recv() => {},
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
