use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, bail};
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use ddtp_translate::config::{AppDirs, Settings, SubmitMethod};
use ddtp_translate::ddtp::{self, DdtpFetcher, DescriptionCache, PackageDescription};
use ddtp_translate::ddtss::{DdtssClient, ReviewDecision};
use ddtp_translate::error::{DdtssError, Error, FetchError, LintError, SubmitError};
use ddtp_translate::lint::{self, LintOutcome};
use ddtp_translate::queue::{self, BatchEvent, BatchSender, SendQueue};
use ddtp_translate::submit::{DdtssSubmitter, EmailSubmitter, Submission, Submitter};
use ddtp_translate::{logging, po};

#[derive(Parser)]
#[command(name = "ddtp-translate")]
#[command(version, about = "Translate Debian package descriptions through the DDTP")]
struct Cli {
    /// Language code (defaults to the configured language)
    #[arg(short, long, global = true, env = "DDTP_LANGUAGE")]
    lang: Option<String>,

    /// Debian release whose Translation files are compared when DDTP is down
    #[arg(long, global = true, value_parser = PossibleValuesParser::new(ddtp::fetcher::DISTS.iter().copied()))]
    dist: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the languages DDTP knows about
    Languages,
    /// List untranslated descriptions
    List {
        /// Ignore the cache
        #[arg(long)]
        refresh: bool,
        /// Show at most this many (defaults to max_packages)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[command(flatten)]
        filter: PackageFilter,
        /// Add each package's DDTSS status (needs a login)
        #[arg(long)]
        status: bool,
    },
    /// Show one untranslated description
    Show {
        package: String,
        /// Show the DDTSS translate form instead (package must be fetched)
        #[arg(long)]
        ddtss: bool,
    },
    /// Log in to DDTSS and store the session
    Login,
    /// Fetch a package (or the next one) for translation on DDTSS
    Fetch { package: Option<String> },
    /// Submit one translation right away
    Submit(TranslationArgs),
    /// Manage the send queue
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Review other translators' work
    #[command(subcommand)]
    Reviews(ReviewCommand),
    /// Give up a translation in progress on DDTSS
    Abandon { package: String },
    /// Show queue, DDTSS and DDTP counters
    Stats,
    /// Check a translation locally and with l10n-lint
    Lint {
        #[command(flatten)]
        translation: TranslationArgs,
        /// Skip the external l10n-lint run
        #[arg(long)]
        local_only: bool,
    },
    /// Export untranslated descriptions as a PO file
    ExportPo {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[command(flatten)]
        filter: PackageFilter,
    },
    /// Queue translations from a PO file
    ImportPo { file: PathBuf },
}

#[derive(clap::Args)]
struct PackageFilter {
    /// Only packages whose name starts with this
    #[arg(long)]
    letter: Option<String>,
    /// Only packages whose name matches this regular expression
    #[arg(long)]
    pattern: Option<Regex>,
}

impl PackageFilter {
    fn apply<'a>(&self, packages: &'a [PackageDescription]) -> Vec<&'a PackageDescription> {
        ddtp::filter_packages(packages, self.letter.as_deref(), self.pattern.as_ref())
    }
}

#[derive(clap::Args)]
struct TranslationArgs {
    package: String,
    /// File with the translation (short line, then long). Stdin if omitted.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Description-md5 (looked up in the untranslated list if omitted)
    #[arg(long)]
    md5: Option<String>,
    #[arg(short, long, default_value = "")]
    comment: String,
}

#[derive(Subcommand)]
enum QueueCommand {
    List,
    Add(TranslationArgs),
    Remove { id: String },
    /// Remove everything except entries being sent
    Clear,
    ClearSent,
    Sort,
    /// Put failed entries back to ready
    Retry,
    /// Send every ready entry (Ctrl-C cancels after the current one)
    Send,
}

#[derive(Subcommand)]
enum ReviewCommand {
    List,
    Show { package: String },
    /// Accept a translation, as is or with the changes in --file
    Accept {
        package: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long, default_value = "")]
        comment: String,
    },
    /// Change only the comment of a translation under review
    Comment { package: String, comment: String },
    /// Accept every pending review not yet reviewed by you
    AcceptAll {
        #[arg(short, long, default_value = "")]
        comment: String,
    },
}

struct App {
    settings: Settings,
    dirs: AppDirs,
    lang: String,
    dist: Option<String>,
}

impl App {
    fn fetcher(&self) -> DdtpFetcher {
        let fetcher =
            DdtpFetcher::from_settings(&self.settings, DescriptionCache::new(&self.dirs.cache_dir));
        match &self.dist {
            Some(dist) => fetcher.with_dist(dist),
            None => fetcher,
        }
    }

    fn ddtss(&self) -> anyhow::Result<DdtssClient> {
        Ok(DdtssClient::from_settings(&self.settings, &self.dirs, &self.lang)?)
    }

    /// A client with a live session.
    async fn ddtss_logged_in(&self) -> anyhow::Result<DdtssClient> {
        let client = self.ddtss()?;
        let (alias, password) = self.settings.ddtss_credentials()?;
        client.ensure_session(&alias, &password).await?;
        Ok(client)
    }

    fn submitter(&self) -> anyhow::Result<Box<dyn Submitter>> {
        Ok(match self.settings.submit_method {
            SubmitMethod::Ddtss => {
                let (alias, password) = self.settings.ddtss_credentials()?;
                Box::new(DdtssSubmitter::new(Arc::new(self.ddtss()?), alias, password))
            }
            SubmitMethod::Email => Box::new(EmailSubmitter::new(self.settings.smtp.clone())),
        })
    }

    async fn queue(&self) -> anyhow::Result<SendQueue> {
        Ok(SendQueue::load(self.dirs.queue_file()).await?)
    }

    async fn find_package(&self, name: &str) -> anyhow::Result<Option<PackageDescription>> {
        let packages = self.fetcher().fetch_untranslated(&self.lang, false).await?;
        Ok(packages.into_iter().find(|p| p.name == name))
    }

    /// Read a translation and turn it into a submission, linting first when
    /// auto_lint is on.
    async fn submission(&self, args: &TranslationArgs) -> anyhow::Result<Submission> {
        let text = read_text(args.file.as_deref()).await?;
        let (short, long) = ddtp::split_translation(&text);
        let original = self.find_package(&args.package).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not look up original description");
            None
        });

        let md5 = match (&args.md5, &original) {
            (Some(md5), _) => md5.clone(),
            (None, Some(pkg)) => pkg.md5.clone(),
            (None, None) if self.settings.submit_method == SubmitMethod::Email => {
                bail!("{} is not in the untranslated list; pass --md5", args.package)
            }
            (None, None) => String::new(),
        };

        if self.settings.auto_lint {
            let orig_long = original.as_ref().map(|p| p.long.as_str()).unwrap_or("");
            let issues = lint::check_translation(orig_long, &short, &long);
            for issue in &issues {
                eprintln!("   {issue}");
            }
            if lint::has_errors(&issues) {
                bail!("translation of {} has lint errors", args.package);
            }
        }

        Ok(Submission {
            package: args.package.clone(),
            md5,
            lang: self.lang.clone(),
            short,
            long,
            comment: args.comment.clone(),
        })
    }
}

async fn read_text(file: Option<&Path>) -> anyhow::Result<String> {
    let text = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    Ok(text)
}

/// Flag set by Ctrl-C.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹  Cancelling after the current item...");
            flag.store(true, Ordering::Relaxed);
        }
    });
    cancel
}

fn print_progress(mut rx: mpsc::UnboundedReceiver<BatchEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Started { total } => eprintln!("📤 Sending {total} translation(s)"),
                BatchEvent::ItemStarted {
                    index,
                    total,
                    package,
                } => eprintln!("   [{index}/{total}] {package}"),
                BatchEvent::ItemSent { package } => eprintln!("   ✓ {package}"),
                BatchEvent::ItemFailed { package, error } => eprintln!("   ✗ {package}: {error}"),
                BatchEvent::Cancelled { remaining } => {
                    eprintln!("   Cancelled, {remaining} left in the queue")
                }
                BatchEvent::Finished(r) => {
                    eprintln!("   Done: {} sent, {} failed", r.sent, r.failed)
                }
            }
        }
    })
}

fn user_message(err: &anyhow::Error) -> String {
    if let Some(e) = err.downcast_ref::<Error>() {
        e.user_message()
    } else if let Some(e) = err.downcast_ref::<DdtssError>() {
        e.user_message()
    } else if let Some(e) = err.downcast_ref::<SubmitError>() {
        e.user_message()
    } else if let Some(e) = err.downcast_ref::<FetchError>() {
        e.user_message()
    } else if let Some(e) = err.downcast_ref::<LintError>() {
        e.user_message()
    } else {
        format!("{err:#}")
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", user_message(&e));
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let dirs = AppDirs::discover()?;
    dirs.ensure()?;
    let mut settings = Settings::load(&dirs.settings_file());
    settings.apply_env()?;

    let _log_guard = logging::init(settings.enable_logging.then(|| dirs.log_dir()));

    let lang = cli.lang.clone().unwrap_or_else(|| settings.default_language.clone());
    if ddtp::language_name(&lang).is_none() {
        tracing::warn!(lang = %lang, "Language code not in the DDTP list");
    }
    let app = App {
        settings,
        dirs,
        lang,
        dist: cli.dist.clone(),
    };

    match cli.command {
        Commands::Languages => {
            for (code, name) in ddtp::DDTP_LANGUAGES {
                println!("{code:8} {name}");
            }
        }
        Commands::List {
            refresh,
            limit,
            filter,
            status,
        } => {
            let packages = app.fetcher().fetch_untranslated(&app.lang, refresh).await?;
            let matching = filter.apply(&packages);
            let limit = limit.unwrap_or(app.settings.max_packages);

            let statuses = if status {
                match app.ddtss_logged_in().await {
                    Ok(client) => client.package_statuses().await?,
                    Err(e) => {
                        eprintln!("DDTSS status unavailable ({})", user_message(&e));
                        Default::default()
                    }
                }
            } else {
                Default::default()
            };

            for p in matching.iter().take(limit) {
                if status {
                    let label = statuses.get(&p.name).map_or("-", |s| s.label());
                    println!("{:32} {:10} {}  {}", p.name, label, p.md5, p.short);
                } else {
                    println!("{:32} {}  {}", p.name, p.md5, p.short);
                }
            }
            eprintln!(
                "{} untranslated, {} matching ({} shown)",
                packages.len(),
                matching.len(),
                matching.len().min(limit)
            );
        }
        Commands::Show { package, ddtss } => {
            if ddtss {
                let page = app.ddtss_logged_in().await?.translate_page(&package).await?;
                println!("Package: {}", page.package);
                println!("Description: {}", page.short_orig);
                println!("{}\n", page.long_orig);
                println!("{}", page.short_trans);
                println!("{}", page.long_trans);
            } else {
                let Some(pkg) = app.find_package(&package).await? else {
                    bail!("{package} is not in the untranslated list for {}", app.lang);
                };
                println!("Package: {}", pkg.name);
                println!("Description-md5: {}", pkg.md5);
                println!("\n{}", pkg.original_text());
            }
        }
        Commands::Login => {
            let client = app.ddtss()?;
            let (alias, password) = app.settings.ddtss_credentials()?;
            let session = client.login(&alias, &password).await?;
            println!("Logged in as {} (session valid until {})", session.alias, session.expires_at.format("%Y-%m-%d"));
        }
        Commands::Fetch { package } => {
            let client = app.ddtss_logged_in().await?;
            let page = client.fetch_package(package.as_deref()).await?;
            println!("Package: {}", page.package);
            println!("Description-md5: {}", ddtp::english_md5(&page.short_orig, &page.long_orig));
            println!("Description: {}", page.short_orig);
            println!("{}\n", page.long_orig);
            println!("{}", page.short_trans);
            println!("{}", page.long_trans);
        }
        Commands::Submit(args) => {
            let submission = app.submission(&args).await?;
            let submitter = app.submitter()?;
            submitter.submit(&submission).await?;
            println!("✓ {} submitted via {}", submission.package, submitter.name());
        }
        Commands::Queue(cmd) => queue_command(&app, cmd).await?,
        Commands::Reviews(cmd) => review_command(&app, cmd).await?,
        Commands::Abandon { package } => {
            app.ddtss_logged_in().await?.abandon(&package).await?;
            println!("Abandoned {package}");
        }
        Commands::Stats => {
            let counts = app.queue().await?.counts();
            println!(
                "Queue: {} total, {} ready, {} sent, {} failed",
                counts.total, counts.ready, counts.sent, counts.error
            );
            match app.fetcher().untranslated_count(&app.lang).await {
                Ok(n) => println!("Untranslated ({}): {n}", app.lang),
                Err(e) => eprintln!("Untranslated: unavailable ({e})"),
            }
            match app.ddtss_logged_in().await {
                Ok(client) => {
                    let s = client.stats().await?;
                    println!(
                        "DDTSS: {} pending translation, {} pending review, {} sent",
                        s.pending_translation, s.pending_review, s.sent
                    );
                }
                Err(e) => eprintln!("DDTSS: unavailable ({})", user_message(&e)),
            }
        }
        Commands::Lint {
            translation,
            local_only,
        } => {
            let text = read_text(translation.file.as_deref()).await?;
            let (short, long) = ddtp::split_translation(&text);
            let pkg = app
                .find_package(&translation.package)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| PackageDescription::new(&translation.package));

            let issues = lint::check_translation(&pkg.long, &short, &long);
            if issues.is_empty() {
                println!("Local checks: no issues");
            }
            for issue in &issues {
                println!("{issue}");
            }

            if local_only {
                return Ok(());
            }
            match lint::run_l10n_lint(&pkg, &app.lang, &text).await {
                Ok(LintOutcome::Clean) => println!("l10n-lint: no issues found ✓"),
                Ok(LintOutcome::Notes(out)) => println!("l10n-lint: passed with notes\n{out}"),
                Ok(LintOutcome::Issues(out)) => println!("l10n-lint: issues found\n{out}"),
                Err(LintError::NotInstalled) => eprintln!("l10n-lint not installed, skipping"),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::ExportPo {
            output,
            limit,
            filter,
        } => {
            let packages = app.fetcher().fetch_untranslated(&app.lang, false).await?;
            let queue = app.queue().await?;
            let limit = limit.unwrap_or(app.settings.max_packages);
            let selected: Vec<PackageDescription> = filter
                .apply(&packages)
                .into_iter()
                .take(limit)
                .map(|p| {
                    let mut p = p.clone();
                    if let Some(entry) = queue.pending_for(&p.md5) {
                        p.set_translation(entry.translation_text());
                    }
                    p
                })
                .collect();
            tokio::fs::write(&output, po::export_po(&app.lang, &selected))
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Exported {} of {} package(s) to {}",
                selected.len(),
                packages.len(),
                output.display()
            );
        }
        Commands::ImportPo { file } => {
            let text = read_text(Some(&file)).await?;
            let packages = app.fetcher().fetch_untranslated(&app.lang, false).await?;
            let submissions = po::import_translations(&text, &app.lang, &packages)?;
            let mut queue = app.queue().await?;
            let mut queued = 0;
            for s in &submissions {
                let original = packages
                    .iter()
                    .find(|p| p.md5 == s.md5)
                    .map_or("", |p| p.long.as_str());
                let issues = lint::check_translation(original, &s.short, &s.long);
                if app.settings.auto_lint && lint::has_errors(&issues) {
                    eprintln!("   skipping {}: lint errors", s.package);
                    continue;
                }
                queue.add(s.clone()).await?;
                queued += 1;
            }
            println!("Queued {queued} translation(s) from {}", file.display());
        }
    }

    Ok(())
}

async fn queue_command(app: &App, cmd: QueueCommand) -> anyhow::Result<()> {
    let mut queue = app.queue().await?;
    match cmd {
        QueueCommand::List => {
            for e in queue.entries() {
                let err = e.error.as_deref().map(|m| format!("  ({m})")).unwrap_or_default();
                println!("{:8}  {:8} {:32} {}{err}", e.short_id(), e.status, e.package, e.short);
            }
            let c = queue.counts();
            eprintln!("{} entries: {} ready, {} sent, {} failed", c.total, c.ready, c.sent, c.error);
        }
        QueueCommand::Add(args) => {
            let submission = app.submission(&args).await?;
            let id = queue.add(submission).await?;
            println!("Queued {} ({})", args.package, queue::short_id(&id));
        }
        QueueCommand::Remove { id } => {
            let id = queue.resolve_id(&id)?;
            let entry = queue.remove(&id).await?;
            println!("Removed {}", entry.package);
        }
        QueueCommand::Clear => println!("Removed {} entries", queue.clear().await?),
        QueueCommand::ClearSent => println!("Removed {} sent entries", queue.clear_sent().await?),
        QueueCommand::Sort => queue.sort().await?,
        QueueCommand::Retry => println!("{} entries back to ready", queue.retry_failed().await?),
        QueueCommand::Send => {
            if queue.ready().is_empty() {
                println!("Nothing to send");
                return Ok(());
            }
            let submitter = app.submitter()?;
            let cancel = cancel_on_ctrl_c();
            let (tx, rx) = mpsc::unbounded_channel();
            let printer = print_progress(rx);

            let report = BatchSender::new(app.settings.send_delay())
                .with_progress(tx)
                .send(&mut queue, submitter.as_ref(), &cancel)
                .await?;
            let _ = printer.await;
            if report.failed > 0 {
                bail!("{} of {} submission(s) failed", report.failed, report.total);
            }
        }
    }
    Ok(())
}

async fn review_command(app: &App, cmd: ReviewCommand) -> anyhow::Result<()> {
    let client = app.ddtss_logged_in().await?;
    match cmd {
        ReviewCommand::List => {
            let items = client.pending_reviews().await?;
            for item in &items {
                let mark = if item.reviewed_by_you { "✓" } else { " " };
                println!("{mark} {:32} {}", item.package, item.note);
            }
            eprintln!("{} pending review(s)", items.len());
        }
        ReviewCommand::Show { package } => {
            let page = client.review_page(&package).await?;
            println!("Package: {}  (owner: {})", page.package, page.owner);
            println!("Original:\n{}\n{}\n", page.short_orig, page.long_orig);
            println!("Proposed:\n{}\n{}\n", page.short_trans, page.long_trans);
            if !page.comment.is_empty() {
                println!("Comment:\n{}\n", page.comment);
            }
            if !page.log.is_empty() {
                println!("Log:\n{}", page.log);
            }
        }
        ReviewCommand::Accept {
            package,
            file,
            comment,
        } => {
            let decision = match file {
                Some(path) => {
                    let page = client.review_page(&package).await?;
                    let text = read_text(Some(&path)).await?;
                    let (short, long) = ddtp::split_translation(&text);
                    let before = format!("{}\n{}", page.short_trans, page.long_trans);
                    let after = format!("{short}\n{long}");
                    for line in lint::line_diff(&before, &after) {
                        println!("{line}");
                    }
                    ReviewDecision::AcceptWithChanges { short, long }
                }
                None => ReviewDecision::AcceptAsIs,
            };
            client.submit_review(&package, &decision, &comment).await?;
            println!("✓ {package}: {}", decision.label());
        }
        ReviewCommand::Comment { package, comment } => {
            client
                .submit_review(&package, &ReviewDecision::CommentOnly, &comment)
                .await?;
            println!("✓ {package}: comment updated");
        }
        ReviewCommand::AcceptAll { comment } => {
            let cancel = cancel_on_ctrl_c();
            let report =
                queue::accept_all_reviews(&client, &comment, app.settings.send_delay(), &cancel).await?;
            println!(
                "Accepted {}, failed {}, skipped {} already reviewed",
                report.accepted,
                report.failed.len(),
                report.skipped
            );
            for (package, error) in &report.failed {
                eprintln!("   ✗ {package}: {error}");
            }
        }
    }
    Ok(())
}
