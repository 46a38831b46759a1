use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use folio::cache::{format_bytes, PersistentCache};
use folio::config::Config;
use folio::model::{catalog, Category, HomeData, Profile, Project, ProjectType};
use folio::remote::{ConnectivitySignal, ReachabilityProbe};
use folio::source::{CategoryView, Sources};
use folio::{logging, DataContext};

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Resolve portfolio data from the live API, local cache or published snapshots")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./folio.yaml, then $XDG_CONFIG_HOME/folio/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Enable verbose logging (debug level)
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, default_value = "text")]
  format: OutputFormat,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
  Text,
  Json,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve one category and print it with its source
  Show {
    /// projects, profile or home
    category: Category,

    /// Only projects of this type
    #[arg(long = "type")]
    project_type: Option<ProjectType>,

    /// Only projects using this technology
    #[arg(long)]
    tech: Option<String>,

    /// Only projects matching this text in title, description or technologies
    #[arg(long)]
    search: Option<String>,
  },
  /// List every technology used across projects
  Technologies,
  /// Resolve every category and print where each came from
  Status,
  /// Keep resolving and print every update until Ctrl-C
  Watch,
  /// Inspect or maintain the persistent cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Entry count and size per tier
  Info,
  /// Remove every cached snapshot
  Clear,
  /// Remove snapshots older than the stale window
  Prune,
}

/// Serializable form of one category view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewReport<'a, T: Serialize> {
  category: Category,
  source: String,
  fetched_at: Option<String>,
  loading: bool,
  error: Option<&'a str>,
  data: Option<&'a T>,
}

impl<'a, T: Serialize> ViewReport<'a, T> {
  fn new(category: Category, view: &'a CategoryView<T>) -> Self {
    Self {
      category,
      source: view.source.to_string(),
      fetched_at: view.fetched_at.map(|t| t.to_rfc3339()),
      loading: view.loading,
      error: view.error.as_deref(),
      data: view.data.as_ref(),
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if args.verbose {
    config.logging.level = "debug".to_string();
  }
  let _log_guard = logging::init(&config.logging)?;

  match args.command {
    Command::Show {
      category,
      project_type,
      tech,
      search,
    } => {
      let filter = ProjectFilter { tech, search };
      show(&config, args.format, category, project_type, filter).await
    }
    Command::Technologies => technologies(&config, args.format).await,
    Command::Status => status(&config, args.format).await,
    Command::Watch => watch(&config).await,
    Command::Cache { action } => cache(&config, args.format, action).await,
  }
}

struct Runtime {
  context: DataContext,
  _probe: Option<ReachabilityProbe>,
}

fn build(config: &Config, project_type: Option<ProjectType>, probe: bool) -> Result<Runtime> {
  let (transport, client) = config
    .client_options()
    .connect()
    .map_err(|e| eyre!("Failed to set up GraphQL client: {}", e))?;

  let statics = config
    .snapshot_location()
    .open(transport.http().clone())
    .map_err(|e| eyre!("Invalid snapshot base URL: {}", e))?;

  let signal = ConnectivitySignal::default();
  let probe = probe.then(|| ReachabilityProbe::spawn(transport.clone(), signal.clone(), config.probe_interval()));

  let sources = Sources {
    remote: client,
    cache: Arc::new(PersistentCache::open(&config.cache_options())),
    statics,
    connectivity: Arc::new(signal),
  };

  let mut options = config.context_options();
  options.project_type = project_type;

  Ok(Runtime {
    context: DataContext::new(sources, options),
    _probe: probe,
  })
}

/// Client-side narrowing of a resolved project list.
#[derive(Debug, Default)]
struct ProjectFilter {
  tech: Option<String>,
  search: Option<String>,
}

impl ProjectFilter {
  fn apply(&self, projects: Vec<Project>) -> Vec<Project> {
    let projects = match &self.tech {
      Some(tech) => catalog::projects_by_technology(&projects, tech),
      None => projects,
    };
    match &self.search {
      Some(query) => catalog::search_projects(&projects, query),
      None => projects,
    }
  }
}

async fn show(
  config: &Config,
  format: OutputFormat,
  category: Category,
  project_type: Option<ProjectType>,
  filter: ProjectFilter,
) -> Result<()> {
  let runtime = build(config, project_type, false)?;
  let ctx = &runtime.context;
  ctx.start().await;

  match category {
    Category::Projects => {
      let mut view = ctx.projects();
      view.data = view.data.map(|projects| filter.apply(projects));
      print_view(format, category, &view, render_projects)
    }
    Category::Profile => print_view(format, category, &ctx.profile(), render_profile),
    Category::HomeStats => print_view(format, category, &ctx.home(), render_home),
  }
}

async fn status(config: &Config, format: OutputFormat) -> Result<()> {
  let runtime = build(config, None, false)?;
  let ctx = &runtime.context;
  ctx.start().await;

  let rows: Vec<(Category, String, Option<String>)> = vec![
    row(Category::Projects, &ctx.projects()),
    row(Category::Profile, &ctx.profile()),
    row(Category::HomeStats, &ctx.home()),
  ];

  match format {
    OutputFormat::Json => {
      let categories: Vec<_> = rows
        .iter()
        .map(|(category, source, error)| {
          serde_json::json!({ "category": category, "source": source, "error": error })
        })
        .collect();
      let report = serde_json::json!({ "status": ctx.status(), "categories": categories });
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
    OutputFormat::Text => {
      println!("status: {}", ctx.status());
      for (category, source, error) in rows {
        match error {
          Some(error) => println!("  {:<10} {:<8} {}", category, source, error),
          None => println!("  {:<10} {}", category, source),
        }
      }
    }
  }
  Ok(())
}

async fn technologies(config: &Config, format: OutputFormat) -> Result<()> {
  let runtime = build(config, None, false)?;
  let ctx = &runtime.context;
  ctx.start().await;

  let view = ctx.projects();
  let technologies = view
    .data
    .as_deref()
    .map(catalog::all_technologies)
    .unwrap_or_default();

  match format {
    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&technologies)?),
    OutputFormat::Text => {
      for tech in technologies {
        println!("{}", tech);
      }
    }
  }
  Ok(())
}

fn row<T>(category: Category, view: &CategoryView<T>) -> (Category, String, Option<String>) {
  (category, view.source.to_string(), view.error.clone())
}

async fn watch(config: &Config) -> Result<()> {
  let runtime = build(config, None, true)?;
  let ctx = &runtime.context;

  let mut projects = ctx.subscribe_projects();
  let mut profile = ctx.subscribe_profile();
  let mut home = ctx.subscribe_home();

  ctx.start().await;
  info!(status = %ctx.status(), "watching for updates");
  println!("status: {}", ctx.status());

  loop {
    tokio::select! {
      Ok(()) = projects.changed() => {
        let view = projects.borrow_and_update().clone();
        println!("{}", summary(Category::Projects, &view, |p| format!("{} projects", p.len())));
      }
      Ok(()) = profile.changed() => {
        let view = profile.borrow_and_update().clone();
        println!("{}", summary(Category::Profile, &view, |p| p.name.clone()));
      }
      Ok(()) = home.changed() => {
        let view = home.borrow_and_update().clone();
        println!("{}", summary(Category::HomeStats, &view, |h| h.name.clone()));
      }
      _ = tokio::signal::ctrl_c() => break,
    }
  }

  println!("status: {}", ctx.status());
  Ok(())
}

fn summary<T>(category: Category, view: &CategoryView<T>, describe: impl Fn(&T) -> String) -> String {
  let mut line = format!("[{}] {} from {}", chrono::Local::now().format("%H:%M:%S"), category, view.source);
  if let Some(data) = &view.data {
    line.push_str(&format!(": {}", describe(data)));
  }
  if view.recovering {
    line.push_str(" (recovering)");
  }
  if let Some(error) = &view.error {
    line.push_str(&format!(" [error: {}]", error));
  }
  line
}

async fn cache(config: &Config, format: OutputFormat, action: CacheAction) -> Result<()> {
  let options = config.cache_options();
  let cache = PersistentCache::open(&options);

  match action {
    CacheAction::Info => {
      let tiers = cache.info().await;
      match format {
        OutputFormat::Json => {
          let tiers: Vec<_> = tiers
            .iter()
            .map(|t| serde_json::json!({ "tier": t.name, "entries": t.entries, "bytes": t.bytes }))
            .collect();
          println!("{}", serde_json::to_string_pretty(&tiers)?);
        }
        OutputFormat::Text => {
          if tiers.is_empty() {
            println!("cache disabled");
          }
          for tier in tiers {
            println!("{:<40} {:>4} entries  {}", tier.name, tier.entries, format_bytes(tier.bytes));
          }
        }
      }
    }
    CacheAction::Clear => {
      let removed = cache.clear_all().await;
      print_count(format, "removed", removed)?;
    }
    CacheAction::Prune => {
      let removed = cache.prune_expired(options.stale_window).await;
      print_count(format, "pruned", removed)?;
    }
  }
  Ok(())
}

fn print_count(format: OutputFormat, label: &str, count: usize) -> Result<()> {
  match format {
    OutputFormat::Json => println!("{}", serde_json::json!({ label: count })),
    OutputFormat::Text => println!("{} {} entries", label, count),
  }
  Ok(())
}

fn print_view<T: Serialize>(
  format: OutputFormat,
  category: Category,
  view: &CategoryView<T>,
  render: fn(&T) -> String,
) -> Result<()> {
  match format {
    OutputFormat::Json => {
      println!("{}", serde_json::to_string_pretty(&ViewReport::new(category, view))?);
    }
    OutputFormat::Text => {
      let fetched = view
        .fetched_at
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
      println!("{} (source: {}, fetched: {})", category, view.source, fetched);
      if let Some(error) = &view.error {
        println!("warning: {}", error);
      }
      if let Some(data) = &view.data {
        println!("{}", render(data));
      }
    }
  }
  Ok(())
}

fn render_projects(projects: &Vec<Project>) -> String {
  projects
    .iter()
    .map(|p| {
      format!(
        "#{:<3} {} [{}]\n     {}",
        p.id,
        p.title,
        p.project_type,
        p.technologies.join(", ")
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

fn render_profile(profile: &Profile) -> String {
  let mut out = profile.name.clone();
  for line in &profile.summary {
    out.push_str(&format!("\n  {}", line));
  }
  if !profile.skills.is_empty() {
    let skills: Vec<&str> = profile.skills.iter().map(|s| s.name.as_str()).collect();
    out.push_str(&format!("\nskills: {}", skills.join(", ")));
  }
  for job in &profile.work_experience {
    out.push_str(&format!("\n- {} @ {} ({})", job.title, job.company, job.years));
  }
  out
}

fn render_home(home: &HomeData) -> String {
  format!(
    "{}\n{}\n{} years experience, {} technologies, {} projects delivered",
    home.name,
    home.roles.join(" | "),
    home.stats.years_experience,
    home.stats.technologies_count,
    home.stats.projects_delivered
  )
}
