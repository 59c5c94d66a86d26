use std::time::Duration;

use clap::Parser;
use quickpoll::client::{EventRouter, Notification, RealtimeClient, WsConnector};
use quickpoll::config::reconnect_policy_from_env;
use quickpoll::realtime::{Event, PollSummary};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Follow QuickPoll mutations as they happen.
#[derive(Parser, Debug)]
#[command(name = "poll-watch")]
struct Args {
    /// Session endpoint.
    #[arg(long, env = "QUICKPOLL_WS_URL", default_value = "ws://localhost:8000/ws")]
    url: String,

    /// REST base URL, used to refresh after a reconnect.
    #[arg(long, env = "QUICKPOLL_API_URL", default_value = "http://localhost:8000")]
    api: String,

    /// Seconds between pulls once real-time delivery has given up.
    #[arg(long, default_value_t = 15)]
    poll_interval_secs: u64,
}

fn describe(event: &Event) -> String {
    match event {
        Event::PollCreated { poll } => format!("poll {} created: {}", poll.id, poll.title),
        Event::OptionAdded { poll_id, option } => {
            format!("poll {poll_id}: option {} added ({})", option.id, option.text)
        }
        Event::VoteCast { poll_id, vote } => format!(
            "poll {poll_id}: {} voted for option {}",
            vote.user_id, vote.option_id
        ),
        Event::LikeAdded { poll_id, like } => format!("poll {poll_id}: liked by {}", like.user_id),
    }
}

async fn refresh(http: &reqwest::Client, api: &str) {
    let url = format!("{}/polls/", api.trim_end_matches('/'));
    let response = match http.get(&url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "refresh failed");
            return;
        }
    };

    match response.json::<Vec<PollSummary>>().await {
        Ok(polls) => {
            info!(polls = polls.len(), "poll list refreshed");
            for poll in &polls {
                println!("  #{} {} ({:?})", poll.id, poll.title, poll.status);
            }
        }
        Err(e) => warn!(error = %e, "unexpected poll list payload"),
    }
}

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let http = reqwest::Client::new();

    let router = EventRouter::new();
    let _printer = router.add_observer(|n| {
        if let Notification::Event(event) = n {
            println!("{}", describe(event));
        }
    });

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let _status = router.add_observer(move |n| {
        if !matches!(n, Notification::Event(_)) {
            let _ = status_tx.send(n.clone());
        }
    });

    let refresh_http = http.clone();
    let refresh_api = args.api.clone();
    let client = RealtimeClient::spawn(
        WsConnector::new(args.url.clone()),
        reconnect_policy_from_env(),
        router,
        move || {
            let http = refresh_http.clone();
            let api = refresh_api.clone();
            tokio::spawn(async move { refresh(&http, &api).await });
        },
    );

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                client.disconnect();
                break;
            }
            status = status_rx.recv() => match status {
                Some(Notification::Connected) => {
                    info!(url = %args.url, "watching");
                    refresh(&http, &args.api).await;
                }
                Some(Notification::Reconnecting { attempt, delay }) => {
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "offline, reconnecting");
                }
                Some(Notification::Unavailable) => {
                    warn!("real-time updates unavailable, falling back to polling");
                    let mut ticker =
                        tokio::time::interval(Duration::from_secs(args.poll_interval_secs.max(1)));
                    loop {
                        tokio::select! {
                            _ = &mut ctrl_c => break,
                            _ = ticker.tick() => refresh(&http, &args.api).await,
                        }
                    }
                    break;
                }
                Some(Notification::Disconnected) | None => break,
                Some(_) => {}
            },
        }
    }

    client.join().await;
}
