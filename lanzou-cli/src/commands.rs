use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use lanzou_core::{
    DownloadSource, EntryKind, EntryRef, FolderListing, HttpRemoteApi, RemoteApi, RemoteId,
    Session, ShareLink, check_password, extract_share_links,
};
use lanzou_transfer::paths::download_target;
use lanzou_transfer::{DownloadRequest, TransferQueue, TransferRequest, plan_uploads};

use crate::cli::{Cli, Command};
use crate::config::CliConfig;
use crate::progress::{self, Summary};

pub async fn run(cli: Cli, mut config: CliConfig) -> anyhow::Result<()> {
    if let Some(concurrency) = cli.concurrency {
        config.queue = config.queue.with_concurrency(concurrency);
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.queue = config.queue.with_chunk_size(chunk_size);
    }
    let api = HttpRemoteApi::with_base_url(&config.base_url)
        .with_context(|| format!("invalid base url {}", config.base_url))?;
    let session = config.session.clone();
    let json = cli.json;

    match cli.command {
        Command::Ls { folder } => {
            let listing = api
                .list_folder(&session, &RemoteId::new(folder))
                .await
                .context("failed to list folder")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(&listing);
            }
        }
        Command::Mkdir { parent, name, desc } => {
            let id = api
                .create_folder(&session, &RemoteId::new(parent), &name, desc.as_deref())
                .await
                .with_context(|| format!("failed to create folder {name}"))?;
            if json {
                println!("{}", serde_json::json!({ "id": id }));
            } else {
                println!("{id}");
            }
        }
        Command::Rename { id, name, folder } => {
            api.rename(&session, &entry_ref(id, folder), &name)
                .await
                .context("rename failed")?;
        }
        Command::Rm { id, folder } => {
            api.delete(&session, &entry_ref(id, folder))
                .await
                .context("delete failed")?;
        }
        Command::Passwd { id, code, folder } => {
            let target = entry_ref(id, folder);
            api.set_password(&session, &target, code.as_deref())
                .await
                .context("failed to set extraction code")?;
        }
        Command::Desc { id, text, folder } => {
            api.set_description(&session, &entry_ref(id, folder), &text)
                .await
                .context("failed to set description")?;
        }
        Command::Mv { id, dest, folder } => {
            api.move_entry(&session, &entry_ref(id, folder), &RemoteId::new(dest))
                .await
                .context("move failed")?;
        }
        Command::Share { text } => {
            let links = extract_share_links(&text);
            if links.is_empty() {
                bail!("no share link found");
            }
            for link in links {
                let info = api
                    .resolve_share_link(&session, &link)
                    .await
                    .with_context(|| format!("failed to resolve {}", link.url()))?;
                if json {
                    println!("{}", serde_json::to_string(&info)?);
                } else {
                    let size = info.size.map(|s| s.to_string()).unwrap_or_default();
                    println!("{}\t{}\t{size}\t{}", link.url(), kind_label(info.kind), info.name);
                    for item in &info.items {
                        println!("  {}\t{}", item.id, item.name);
                    }
                }
            }
        }
        Command::Upload {
            paths,
            folder,
            depth,
            pwd,
            desc,
        } => {
            if let Some(code) = pwd.as_deref() {
                check_password(EntryKind::File, code)?;
            }
            let requests = plan_uploads(&paths, &RemoteId::new(folder), depth)?
                .into_iter()
                .map(|request| with_file_settings(request, pwd.as_deref(), desc.as_deref()))
                .collect::<Vec<_>>();
            if requests.is_empty() {
                bail!("nothing to upload");
            }
            let summary = transfer(api, session, &config, requests, json).await?;
            finish(summary)?;
        }
        Command::Download {
            targets,
            out,
            pwd,
            from,
        } => {
            let out = out.unwrap_or_else(|| config.download_dir.clone());
            let requests =
                download_requests(&api, &session, &targets, &out, pwd.as_deref(), &from).await?;
            let summary = transfer(api, session, &config, requests, json).await?;
            finish(summary)?;
        }
    }
    Ok(())
}

async fn transfer(
    api: HttpRemoteApi,
    session: Session,
    config: &CliConfig,
    requests: Vec<TransferRequest>,
    json: bool,
) -> anyhow::Result<Summary> {
    let queue = TransferQueue::new(api, session, config.queue)?;
    let mut events = queue.subscribe();
    let ids = queue.submit(requests)?;
    tracing::info!(count = ids.len(), concurrency = queue.concurrency(), "transfers queued");
    let summary = progress::watch(&queue, &mut events, &ids, json).await?;
    queue.shutdown();
    Ok(summary)
}

fn finish(summary: Summary) -> anyhow::Result<()> {
    eprintln!(
        "{} completed, {} failed, {} cancelled",
        summary.completed, summary.failed, summary.cancelled
    );
    if summary.failed > 0 {
        bail!("{} transfer(s) failed", summary.failed);
    }
    Ok(())
}

async fn download_requests<A: RemoteApi>(
    api: &A,
    session: &Session,
    targets: &[String],
    out: &Path,
    pwd: Option<&str>,
    from: &str,
) -> anyhow::Result<Vec<TransferRequest>> {
    let mut requests = Vec::new();
    let mut names: Option<FolderListing> = None;
    let mut seen = HashSet::new();
    let mut taken = HashSet::new();

    for target in targets {
        if !seen.insert(target.as_str()) {
            tracing::warn!(target = %target, "duplicate download target skipped");
            continue;
        }
        if target.contains("://") {
            let link = ShareLink::parse(target, pwd)?;
            let info = api
                .resolve_share_link(session, &link)
                .await
                .with_context(|| format!("failed to resolve {target}"))?;
            if info.kind == EntryKind::Folder {
                let dir = download_target(out, &info.name)?;
                for item in info.items.iter().filter(|item| item.kind == EntryKind::File) {
                    requests.push(request(
                        DownloadSource::File(item.id.clone()),
                        unique_target(&mut taken, download_target(&dir, &item.name)?),
                    ));
                }
            } else {
                requests.push(request(
                    DownloadSource::Share(link),
                    unique_target(&mut taken, download_target(out, &info.name)?),
                ));
            }
            continue;
        }

        if names.is_none() {
            let listing = api
                .list_folder(session, &RemoteId::new(from))
                .await
                .with_context(|| format!("failed to list folder {from}"))?;
            names = Some(listing);
        }
        let name = names
            .as_ref()
            .and_then(|listing| listing.files().find(|entry| entry.id.as_str() == target.as_str()))
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| target.clone());
        requests.push(request(
            DownloadSource::File(RemoteId::new(target.as_str())),
            unique_target(&mut taken, download_target(out, &name)?),
        ));
    }
    if requests.is_empty() {
        bail!("nothing to download");
    }
    Ok(requests)
}

/// Returns `target`, or `name (n).ext` beside it when an earlier request
/// already writes to that path.
fn unique_target(taken: &mut HashSet<PathBuf>, target: PathBuf) -> PathBuf {
    if taken.insert(target.clone()) {
        return target;
    }
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned());
    let mut n = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = target.with_file_name(name);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn with_file_settings(
    request: TransferRequest,
    password: Option<&str>,
    description: Option<&str>,
) -> TransferRequest {
    match request {
        TransferRequest::Upload(mut upload) => {
            upload.password = password.map(str::to_string);
            upload.description = description.map(str::to_string);
            TransferRequest::Upload(upload)
        }
        other => other,
    }
}

fn request(source: DownloadSource, target: PathBuf) -> TransferRequest {
    TransferRequest::from(DownloadRequest::new(source, target))
}

fn entry_ref(id: String, folder: bool) -> EntryRef {
    if folder {
        EntryRef::folder(id)
    } else {
        EntryRef::file(id)
    }
}

fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Folder => "folder",
    }
}

fn print_listing(listing: &FolderListing) {
    let path = listing
        .path
        .iter()
        .map(|crumb| crumb.name.as_str())
        .collect::<Vec<_>>()
        .join("/");
    println!("/{path}");
    for entry in listing.folders() {
        println!("{:>12}  {:>10}  {}/", entry.id.as_str(), "-", entry.name);
    }
    for entry in listing.files() {
        let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
        println!("{:>12}  {size:>10}  {}", entry.id.as_str(), entry.name);
    }
}
