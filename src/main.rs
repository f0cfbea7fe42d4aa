mod backend;
mod cli;
mod core;
mod i18n;
mod logging;

use backend::http::HttpBackend;
use clap::{Arg, ArgAction, ArgMatches, Command};
use cli::{ClientCliConfig, CliRegistry};
use crate::core::error::SubmissionError;
use crate::core::events::{ProgressEvent, SessionEvent};
use crate::core::format::{format_count, format_duration, format_size_mb};
use crate::core::lookup;
use crate::core::model::{DownloadJob, DownloadRequest, FileRef, JobState, SegmentSpec};
use crate::core::platform::Platform;
use crate::core::session::{DownloadSession, SessionConfig};
use futures::StreamExt;
use i18n::{Locale, Messages};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

fn url_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).help(help).required(true).num_args(1)
}

fn platform_arg() -> Arg {
    Arg::new("platform")
        .long("platform")
        .short('p')
        .help("youtube, instagram, facebook, tiktok, twitch or x (guessed from the URL when omitted)")
        .num_args(1)
}

fn out_dir_arg() -> Arg {
    Arg::new("out_dir")
        .long("out-dir")
        .help("Save the produced file here instead of printing its URL")
        .num_args(1)
}

fn segment_args(cmd: Command, required: bool) -> Command {
    cmd.arg(Arg::new("start").long("start").help("Clip start, MM:SS or HH:MM:SS").required(required).num_args(1))
        .arg(Arg::new("end").long("end").help("Clip end, MM:SS or HH:MM:SS").required(required).num_args(1))
        .arg(Arg::new("name").long("name").help("File name for the clip").num_args(1))
}

fn build_cli(registry: &CliRegistry) -> Command {
    let download = Command::new("download")
        .about("Ask the server to download a video and wait for the file")
        .arg(url_arg("url", "Video URL"))
        .arg(platform_arg())
        .arg(Arg::new("quality").long("quality").help("e.g. best, 720p (YouTube only)").num_args(1))
        .arg(Arg::new("format").long("format").help("e.g. mp4, mp3 (YouTube only)").num_args(1))
        .arg(out_dir_arg());

    let info = Command::new("info")
        .about("Show server-side metadata for a video")
        .arg(url_arg("url", "Video URL"))
        .arg(platform_arg());

    let validate = Command::new("validate")
        .about("Ask the server whether a URL is downloadable")
        .arg(url_arg("url", "Video URL"))
        .arg(platform_arg());

    let vods = Command::new("vods")
        .about("List a streamer's VODs, optionally clipping one of them")
        .arg(url_arg("username", "Streamer name"))
        .arg(platform_arg().default_value("twitch"))
        .arg(Arg::new("max").long("max").help("Maximum VODs to list").default_value("10").num_args(1))
        .arg(
            Arg::new("pick")
                .long("pick")
                .help("Index of the VOD to clip")
                .requires("start")
                .requires("end")
                .num_args(1),
        )
        .arg(out_dir_arg());
    let vods = segment_args(vods, false);

    let segment = Command::new("segment")
        .about("Clip part of a Twitch VOD")
        .arg(url_arg("vod_url", "VOD URL"))
        .arg(out_dir_arg());
    let segment = segment_args(segment, true);

    let root = Command::new("UniversalDownloader")
        .about("Client for the universal video download server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .global(true)
                .help("Message language: en or pt")
                .default_value("en")
                .num_args(1),
        )
        .subcommand(download)
        .subcommand(info)
        .subcommand(validate)
        .subcommand(vods)
        .subcommand(segment);

    registry.augment_command(root)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = CliRegistry::with_defaults();
    let matches = build_cli(&registry).get_matches();
    let (name, m) = matches
        .subcommand()
        .ok_or_else(|| anyhow::anyhow!("missing subcommand"))?;

    logging::init_tracing(m.get_flag("verbose"));
    let locale = m.get_one::<String>("locale").map(|s| Locale::parse(s)).unwrap_or_default();
    let msgs = i18n::get_messages(locale);

    if let Err(e) = run(name, m, &registry, msgs).await {
        eprintln!("{}", error_line(msgs, &e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(name: &str, m: &ArgMatches, registry: &CliRegistry, msgs: &'static Messages) -> anyhow::Result<()> {
    let mut cfg = ClientCliConfig::default();
    registry.apply_matches(m, &mut cfg)?;
    let backend = Arc::new(HttpBackend::new(cfg.backend.clone())?);
    debug!(server = %cfg.backend.base_url, "backend ready");

    match name {
        "download" => {
            let url = required(m, "url")?;
            let platform = resolve_platform(m, url, msgs)?;
            let mut request = DownloadRequest::new(url, platform);
            let quality = m.get_one::<String>("quality");
            let format = m.get_one::<String>("format");
            if platform.capabilities().has_options {
                if let Some(q) = quality {
                    request = request.with_quality(q);
                }
                if let Some(f) = format {
                    request = request.with_format(f);
                }
            } else if quality.is_some() || format.is_some() {
                warn!(%platform, "dropping quality/format options");
                eprintln!("[{}] {}", msgs.info_prefix, msgs.options_ignored);
            }
            run_download(backend, cfg.session, request, out_dir(m), msgs).await
        }
        "segment" => {
            let segment = segment_spec(m, None)?;
            let request = DownloadRequest::new(required(m, "vod_url")?, Platform::Twitch).with_segment(segment);
            run_download(backend, cfg.session, request, out_dir(m), msgs).await
        }
        "info" => {
            let url = required(m, "url")?;
            let platform = resolve_platform(m, url, msgs)?;
            let v = lookup::fetch_video_info(backend.as_ref(), url, platform).await?;
            println!("{}: {}", msgs.title, v.title);
            println!("{}: {}", msgs.uploader, v.uploader);
            if let Some(d) = v.duration.filter(|d| *d > 0.0) {
                println!("{}: {}", msgs.duration, format_duration(d));
            }
            if let Some(views) = v.view_count {
                println!("{}: {}", msgs.views, format_count(views));
            }
            if let Some(likes) = v.like_count {
                println!("{}: {}", msgs.likes, format_count(likes));
            }
            if let Some(kind) = &v.post_type {
                match v.carousel_count {
                    Some(n) => println!("{kind} ({n})"),
                    None => println!("{kind}"),
                }
            }
            if let Some(thumb) = &v.thumbnail {
                println!("{thumb}");
            }
            Ok(())
        }
        "validate" => {
            let url = required(m, "url")?;
            let platform = resolve_platform(m, url, msgs)?;
            let v = lookup::validate_url(backend.as_ref(), url, platform).await?;
            let verdict = if v.valid { msgs.url_valid } else { msgs.url_invalid };
            println!("{url}: {verdict} ({})", v.message);
            Ok(())
        }
        "vods" => {
            let platform = resolve_platform(m, "", msgs)?;
            if !platform.capabilities().has_search {
                anyhow::bail!("{platform} has no VOD search");
            }
            let max: u32 = required(m, "max")?.parse()?;
            let vods = lookup::search_vods(backend.as_ref(), required(m, "username")?, max).await?;
            if vods.is_empty() {
                println!("{}", msgs.no_vods);
                return Ok(());
            }
            for v in &vods {
                println!(
                    "{:>3}  {:>8}  {:<10}  {:>12}  {}",
                    v.index,
                    v.duration.map(format_duration).unwrap_or_else(|| "-".into()),
                    v.upload_date,
                    v.view_count.map(format_count).unwrap_or_else(|| "-".into()),
                    v.title
                );
            }

            let Some(pick) = m.get_one::<String>("pick") else {
                return Ok(());
            };
            let pick: u32 = pick.parse()?;
            let vod = vods
                .iter()
                .find(|v| v.index == pick)
                .ok_or_else(|| anyhow::anyhow!("{}: {pick}", msgs.pick_out_of_range))?;
            let suggested = lookup::suggest_segment_name(&vod.title);
            let segment = segment_spec(m, Some(suggested))?;
            let request = DownloadRequest::new(vod.url.clone(), platform).with_segment(segment);
            run_download(backend, cfg.session, request, out_dir(m), msgs).await
        }
        other => anyhow::bail!("unknown subcommand: {other}"),
    }
}

fn error_line(msgs: &Messages, e: &anyhow::Error) -> String {
    format!("[{}] {e:#}", msgs.error_prefix)
}

fn required<'a>(m: &'a ArgMatches, id: &str) -> anyhow::Result<&'a str> {
    m.get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing --{id}"))
}

fn out_dir(m: &ArgMatches) -> Option<PathBuf> {
    m.get_one::<String>("out_dir").map(PathBuf::from)
}

fn resolve_platform(m: &ArgMatches, url: &str, msgs: &Messages) -> anyhow::Result<Platform> {
    match m.get_one::<String>("platform") {
        Some(p) => Ok(p.parse()?),
        None => Platform::detect(url).ok_or_else(|| anyhow::anyhow!("{}", msgs.platform_unknown)),
    }
}

fn segment_spec(m: &ArgMatches, suggested_name: Option<String>) -> anyhow::Result<SegmentSpec> {
    let custom_name = m
        .get_one::<String>("name")
        .cloned()
        .or(suggested_name)
        .filter(|n| !n.trim().is_empty());
    Ok(SegmentSpec {
        start: required(m, "start")?.to_string(),
        end: required(m, "end")?.to_string(),
        custom_name,
    })
}

async fn run_download(
    backend: Arc<HttpBackend>,
    session_cfg: SessionConfig,
    request: DownloadRequest,
    out_dir: Option<PathBuf>,
    msgs: &'static Messages,
) -> anyhow::Result<()> {
    let session = DownloadSession::new(backend.clone(), session_cfg);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")?.tick_chars("|/-\\ "));
    spinner.set_prefix(format!("[{}]", request.platform));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("{} {}", msgs.submitting, request.source_url));

    let mut rx = session.subscribe();
    let ui = spinner.clone();
    let events_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Info { scope, message }) => {
                    ui.println(format!("[{}] {}: {}", msgs.info_prefix, scope, message));
                }
                Ok(SessionEvent::StateChanged { job_id, state }) => {
                    debug!(job_id = ?job_id, ?state, "session state");
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let canceller = session.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel().await;
        }
    });

    let outcome = drive(&session, request, &spinner, msgs).await;
    ctrl_c.abort();
    events_task.abort();

    let job = match outcome {
        Ok(Some(job)) => job,
        Ok(None) => {
            spinner.finish_with_message(msgs.cancelled);
            return Ok(());
        }
        Err(e) => {
            spinner.finish_with_message(msgs.failed);
            return Err(e);
        }
    };

    if !job.state.is_terminal() {
        anyhow::bail!("status loop ended with job {} still {:?}", job.id, job.state);
    }
    match job.state {
        JobState::Completed => {
            spinner.finish_with_message(msgs.completed);
            let file = DownloadSession::retrieve_file(&job)?;
            info!(job_id = %job.id, platform = %job.request.platform, file = %file.name, "ready");
            if file.size_bytes > 0 {
                println!("{}: {} ({}: {})", msgs.file_ready, file.name, msgs.size, format_size_mb(file.size_bytes));
            } else {
                println!("{}: {}", msgs.file_ready, file.name);
            }
            match out_dir {
                Some(dir) => {
                    let dest = save_file(&backend, &file, &dir).await?;
                    println!("{}: {}", msgs.saved_to, dest.display());
                }
                None => println!("{}", file.retrieval_url),
            }
            Ok(())
        }
        JobState::TimedOut => {
            spinner.finish_with_message(msgs.timed_out);
            anyhow::bail!("{}: {}", msgs.timed_out, job.error_detail.unwrap_or_default())
        }
        _ => {
            spinner.finish_with_message(msgs.failed);
            anyhow::bail!("{}: {}", msgs.failed, job.error_detail.unwrap_or_default())
        }
    }
}

/// Submits and polls to the end. `None` means the user cancelled.
async fn drive(
    session: &DownloadSession,
    request: DownloadRequest,
    spinner: &ProgressBar,
    msgs: &Messages,
) -> anyhow::Result<Option<DownloadJob>> {
    let job = match session.submit(request).await {
        Ok(job) => job,
        Err(SubmissionError::Cancelled) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    spinner.println(format!("{}: {}", msgs.job_started, job.id));

    let poll = session.poll_until_terminal(&job.id).await?;
    debug!(job_id = poll.job_id(), "polling");
    let mut events = Box::pin(poll.into_stream());
    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::Progress { status, percent, message, .. } => {
                let pct = percent.map(|p| format!(" {p:.0}%")).unwrap_or_default();
                let extra = message.map(|m| format!(" - {m}")).unwrap_or_default();
                spinner.set_message(format!("{} ({status}){pct}{extra}", msgs.processing));
            }
            ProgressEvent::Retrying { attempt, detail, .. } => {
                spinner.set_message(format!("{} #{attempt}: {detail}", msgs.retrying));
            }
            other => debug!(job_id = other.job_id(), terminal = other.is_terminal(), "poll finished"),
        }
    }

    debug!(state = ?session.state().await, "session settled");
    Ok(session.current_job().await)
}

async fn save_file(backend: &HttpBackend, file: &FileRef, dir: &Path) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let mut name = sanitize_filename::sanitize(&file.name);
    if name.is_empty() {
        name = "video.mp4".to_string();
    }
    let dest = dir.join(name);

    let bar = ProgressBar::new(file.size_bytes);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
    )?);
    let written = backend
        .fetch_file(file, &dest, |written, total| {
            if let Some(t) = total {
                bar.set_length(t);
            }
            bar.set_position(written);
        })
        .await;
    bar.finish_and_clear();

    let written = written?;
    info!(path = %dest.display(), bytes = written, "file saved");
    Ok(dest)
}
