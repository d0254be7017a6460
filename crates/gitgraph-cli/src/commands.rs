use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::Colorize;
use gitgraph_model::{
    AnyObject, Association, EdgeCursor, LazyCursor, ModelResult, Relation, Repository, Session,
};
use gitgraph_store::SnapshotStore;
use gitgraph_types::ObjectId;
use serde_json::{json, Value};
use tracing::debug;

use crate::cli::*;
use crate::config::CliConfig;

/// Open the snapshot, run one command, and persist if it wrote anything.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(cli.config.as_deref(), cli.data)?;
    let store = Arc::new(
        SnapshotStore::open(&config.data)
            .with_context(|| format!("opening {}", config.data.display()))?,
    );
    let mut session = Session::with_config(store.clone(), config.model)?;
    let format = cli.format;

    let wrote = match cli.command {
        Command::Lookup(args) => cmd_lookup(&session, args, format)?,
        Command::Register(args) => cmd_register(&mut session, args, format)?,
        Command::Approve(args) => cmd_approve(&mut session, args, format)?,
        Command::Queue(args) => cmd_queue(&session, args, format)?,
        Command::Top(args) => cmd_top(&session, args, format)?,
        Command::Recount(args) => cmd_recount(&mut session, args, format)?,
        Command::Claim(args) => cmd_claim(&mut session, args, format)?,
        Command::Finish(args) => cmd_finish(&mut session, args, format)?,
        Command::Link(args) => cmd_link(&mut session, args, format)?,
        Command::Edges(args) => cmd_edges(&session, args, format)?,
        Command::Reset => cmd_reset(&mut session, format)?,
    };

    if wrote {
        session.flush()?;
        store.persist()?;
        debug!(path = %store.path().display(), "snapshot persisted");
    }
    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn repository_json(repo: &Repository) -> Value {
    json!({
        "id": repo.id().as_str(),
        "url": repo.url(),
        "approved": repo.is_approved(),
        "indexing": repo.is_indexing(),
        "been_indexed": repo.been_indexed(),
        "last_index": repo.last_index().to_rfc3339(),
        "count": repo.count(),
    })
}

fn print_repository(repo: &Repository) {
    let status = if repo.is_indexing() {
        "indexing".yellow()
    } else if repo.been_indexed() {
        "indexed".green()
    } else {
        "new".dimmed()
    };
    println!(
        "{}  {:>8}  {}  {}",
        repo.id().as_str().yellow(),
        repo.count(),
        status,
        repo.url()
    );
}

fn print_repositories(repos: LazyCursor<Repository>, format: OutputFormat) -> anyhow::Result<()> {
    let repos = repos.collect::<ModelResult<Vec<_>>>()?;
    match format {
        OutputFormat::Json => print_json(&Value::Array(repos.iter().map(repository_json).collect())),
        OutputFormat::Text => {
            if repos.is_empty() {
                println!("No repositories.");
            }
            for repo in &repos {
                print_repository(repo);
            }
            Ok(())
        }
    }
}

fn cmd_lookup(session: &Session, args: LookupArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let page = AnyObject::lookup_by_sha1(session, &args.sha, args.partial, args.offset, args.limit)?;
    match format {
        OutputFormat::Json => {
            let items: Vec<Value> = page
                .items
                .iter()
                .map(|object| {
                    json!({
                        "kind": object.kind().to_string(),
                        "id": object.id().as_str(),
                        "dirty": object.is_dirty(),
                        "repository_ids": object
                            .repository_ids()
                            .iter()
                            .map(|r| r.as_str())
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();
            print_json(&json!({ "total": page.total, "items": items }))?;
        }
        OutputFormat::Text => {
            for object in &page.items {
                let dirty = if object.is_dirty() { " (dirty)".red() } else { "".normal() };
                println!("{:<6} {}{}", object.kind().to_string().cyan(), object.id().as_str().yellow(), dirty);
                for repo in object.repository_ids().iter() {
                    println!("         in {}", repo.as_str().dimmed());
                }
            }
            println!(
                "{} of {} match(es)",
                page.items.len().to_string().bold(),
                page.total.to_string().bold()
            );
        }
    }
    Ok(false)
}

fn cmd_register(session: &mut Session, args: RegisterArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let mut repo = Repository::register(session, &args.url)?;
    if args.approve {
        repo.set_approved(true);
        repo.save(session)?;
    }
    match format {
        OutputFormat::Json => print_json(&repository_json(&repo))?,
        OutputFormat::Text => println!("{} Registered {} as {}", "✓".green().bold(), args.url.blue(), repo.id().as_str().yellow()),
    }
    Ok(true)
}

fn cmd_approve(session: &mut Session, args: RepoArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let mut repo = Repository::get(session, &args.repo)?;
    repo.set_approved(true);
    repo.save(session)?;
    match format {
        OutputFormat::Json => print_json(&repository_json(&repo))?,
        OutputFormat::Text => println!("{} Approved {}", "✓".green().bold(), args.repo.yellow()),
    }
    Ok(true)
}

fn cmd_queue(session: &Session, args: QueueArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let cutoff = match args.before.as_deref() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("invalid --before time {raw:?}"))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    print_repositories(Repository::get_indexed_before(session, cutoff)?, format)?;
    Ok(false)
}

fn cmd_top(session: &Session, args: TopArgs, format: OutputFormat) -> anyhow::Result<bool> {
    print_repositories(Repository::get_by_highest_count(session, args.limit, !args.ascending)?, format)?;
    Ok(false)
}

fn cmd_recount(session: &mut Session, args: RepoArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let mut repo = Repository::get(session, &args.repo)?;
    let count = repo.count_objects(session)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "id": args.repo, "count": count }))?,
        OutputFormat::Text => println!("{} {} holds {} object(s)", "✓".green().bold(), args.repo.yellow(), count.to_string().bold()),
    }
    Ok(true)
}

fn cmd_claim(session: &mut Session, args: RepoArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let claimed = Repository::claim(session, &args.repo)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "id": args.repo, "claimed": claimed }))?,
        OutputFormat::Text if claimed => println!("{} Claimed {}", "✓".green().bold(), args.repo.yellow()),
        OutputFormat::Text => println!("{} {} is busy, unapproved or unknown", "✗".red().bold(), args.repo.yellow()),
    }
    Ok(claimed)
}

fn cmd_finish(session: &mut Session, args: RepoArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let at = Utc::now();
    let released = Repository::release(session, &args.repo, at)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "id": args.repo, "released": released, "at": at.to_rfc3339() }))?,
        OutputFormat::Text if released => println!("{} Finished {} at {}", "✓".green().bold(), args.repo.yellow(), at.to_rfc3339()),
        OutputFormat::Text => println!("{} {} was not claimed", "✗".red().bold(), args.repo.yellow()),
    }
    Ok(released)
}

fn cmd_link(session: &mut Session, args: LinkArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let relation: Relation = args.relation.parse()?;
    if relation.is_labeled() && args.label.is_none() {
        anyhow::bail!("relation {relation} needs --label");
    }
    Association::link(
        session,
        relation,
        args.key1.as_str().into(),
        args.key2.as_str().into(),
        args.label.as_deref(),
    )?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "relation": relation.to_string(),
            "key1": args.key1,
            "key2": args.key2,
            "label": args.label,
        }))?,
        OutputFormat::Text => println!("{} {} {} → {}", "✓".green().bold(), relation.to_string().cyan(), args.key1.yellow(), args.key2.yellow()),
    }
    Ok(true)
}

fn cmd_edges(session: &Session, args: EdgesArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let relation: Relation = args.relation.parse()?;
    let id = ObjectId::parse(&args.id).with_context(|| format!("invalid object id {:?}", args.id))?;
    let edges: EdgeCursor = if args.reverse {
        Association::sources_of(session, relation, &id)?
    } else {
        Association::targets_of(session, relation, &id)?
    };
    let edges = edges.collect::<ModelResult<Vec<_>>>()?;
    match format {
        OutputFormat::Json => {
            let items: Vec<Value> = edges
                .iter()
                .map(|(peer, label)| json!({ "id": peer.as_str(), "label": label }))
                .collect();
            print_json(&Value::Array(items))?;
        }
        OutputFormat::Text => {
            if edges.is_empty() {
                println!("No edges.");
            }
            for (peer, label) in &edges {
                match label {
                    Some(label) => println!("{}  {}", peer.as_str().yellow(), label),
                    None => println!("{}", peer.as_str().yellow()),
                }
            }
        }
    }
    Ok(false)
}

fn cmd_reset(session: &mut Session, format: OutputFormat) -> anyhow::Result<bool> {
    session.reset_schema()?;
    match format {
        OutputFormat::Json => print_json(&json!({ "reset": true }))?,
        OutputFormat::Text => println!("{} Index cleared.", "✓".green().bold()),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use gitgraph_model::{Blob, Tree};
    use gitgraph_store::{DocumentStore, Filter};
    use gitgraph_types::RepositoryId;
    use std::path::Path;

    fn run(data: &Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["gitgraph", "--data", data.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    fn oid(c: char) -> String {
        c.to_string().repeat(40)
    }

    #[test]
    fn register_approve_claim_finish() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        let url = "https://example.com/repo.git";
        let id = RepositoryId::from_url(url);

        run(&data, &["register", url]).unwrap();
        run(&data, &["approve", id.as_str()]).unwrap();
        run(&data, &["claim", id.as_str()]).unwrap();
        run(&data, &["finish", id.as_str()]).unwrap();

        let store = Arc::new(SnapshotStore::open(&data).unwrap());
        let mut session = Session::new(store);
        let repo = Repository::get(&mut session, id.as_str()).unwrap();
        assert_eq!(repo.url(), url);
        assert!(repo.is_approved());
        assert!(repo.been_indexed());
        assert!(!repo.is_indexing());
    }

    #[test]
    fn link_then_read_edges() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        let (blob, tree) = (oid('a'), oid('b'));

        run(&data, &["link", "blob-tree", &blob, &tree, "--label", "file.py"]).unwrap();
        run(&data, &["link", "blob-tree", &blob, &tree, "--label", "file.py"]).unwrap();
        run(&data, &["edges", "blob-tree", &blob]).unwrap();

        let store = Arc::new(SnapshotStore::open(&data).unwrap());
        assert_eq!(store.count(Relation::BlobTree.collection(), &Filter::All).unwrap(), 1);
        let session = Session::new(store);
        let names = Blob::new(blob.parse().unwrap()).parents_with_names(&session).unwrap();
        assert_eq!(names, vec![(tree.parse::<ObjectId>().unwrap(), "file.py".to_string())]);
    }

    #[test]
    fn edges_rejects_abbreviated_id() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        run(&data, &["link", "commit-parent-commit", &oid('1'), &oid('2')]).unwrap();
        run(&data, &["link", "commit-parent-commit", &oid('3'), &oid('4')]).unwrap();

        assert!(run(&data, &["edges", "commit-parent-commit", "1111"]).is_err());
        assert!(run(&data, &["edges", "commit-parent-commit", "2222", "--reverse"]).is_err());
        run(&data, &["edges", "commit-parent-commit", &oid('1')]).unwrap();
    }

    #[test]
    fn labeled_relation_requires_label() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        assert!(run(&data, &["link", "blob_tree", &oid('a'), &oid('b')]).is_err());
        assert!(run(&data, &["link", "no_such_relation", &oid('a'), &oid('b')]).is_err());
        assert!(!data.exists());
    }

    #[test]
    fn read_only_commands_do_not_create_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        run(&data, &["lookup", "ab", "--partial"]).unwrap();
        run(&data, &["queue"]).unwrap();
        run(&data, &["top", "-n", "3"]).unwrap();
        assert!(!data.exists());
    }

    #[test]
    fn reset_clears_index() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        run(&data, &["link", "tree-parent-tree", &oid('c'), &oid('d'), "--label", "src"]).unwrap();
        run(&data, &["--format", "json", "reset"]).unwrap();

        let store = Arc::new(SnapshotStore::open(&data).unwrap());
        let session = Session::new(store);
        assert!(Tree::new(oid('c').parse().unwrap())
            .parents_with_names(&session)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalid_cutoff_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("index.json");
        assert!(run(&data, &["queue", "--before", "yesterday"]).is_err());
    }
}
