//! The `run` subcommand: bring up the forwarder over a UDP channel.

use anyhow::{Context, Result};
use log::info;
use rust_slndn_common::ndn::{Name, PrefixAnnouncement};
use rust_slndn_fwd::channel::UdpChannel;
use rust_slndn_fwd::rib::RibService;
use rust_slndn_fwd::{Executors, Forwarder, ForwarderConfig};
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Lifetime of locally registered producer announcements.
const LOCAL_ANNOUNCEMENT_LIFETIME_MS: u64 = 3_600_000;

pub struct RunOptions {
    pub listen: SocketAddr,
    pub group: Option<SocketAddr>,
    pub announce: Vec<String>,
    pub cs_capacity: usize,
}

pub async fn run(opts: RunOptions) -> Result<()> {
    let (executors, main_rx, rib_rx) = Executors::new();
    let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();

    let config = ForwarderConfig {
        cs_capacity: opts.cs_capacity,
        ..Default::default()
    };
    let forwarder =
        Forwarder::new(config, executors.clone()).context("failed to construct the forwarder")?;
    let rib = RibService::new(executors.clone());

    // Producer prefixes announced to peers that discover us.
    for prefix in &opts.announce {
        let pa = PrefixAnnouncement::new(
            Name::from_uri(prefix),
            LOCAL_ANNOUNCEMENT_LIFETIME_MS,
            vec![0xA5; 32],
        );
        info!("announcing local prefix {}", pa.prefix);
        executors.run_on_rib(move |rib| rib.manager_mut().register_announcement(pa));
    }

    let channel = UdpChannel::bind(opts.listen, opts.group, executors.clone(), ingress_tx)
        .await
        .context("failed to open the UDP channel")?;
    if channel.create_group_face().is_none() {
        info!("no multicast group joined; discovery reaches unicast peers only");
    }
    channel.spawn_receiver();
    info!(
        "forwarder up on {} (group: {})",
        opts.listen,
        opts.group.map(|g| g.to_string()).unwrap_or_else(|| "none".into())
    );

    let rib_loop = tokio::spawn(rib.run(rib_rx));
    let main_loop = tokio::spawn(forwarder.run(main_rx, ingress_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    info!("shutting down");
    rib_loop.abort();
    main_loop.abort();
    Ok(())
}
