#![forbid(unsafe_code)]

use std::path::PathBuf;

use achievement_review_coordinator::{LifecycleCoordinator, ListProjector, ListRequest};
use achievement_review_domain::{
    AchievementId, Actor, ActorId, AttachmentInput, CompetitionDetails, DetailContent, Role,
    Status, StudentId,
};
use achievement_review_store::SortOrder;
use achievement_review_store_sqlite::{
    SqliteDetailStore, SqliteProfileDirectory, SqliteReferenceStore,
};
use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "achievement-review")]
#[command(about = "Student achievement review workflow over split SQLite stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or migrate all three databases.
    Init(InitArgs),
    /// Manage student profiles and advisee links.
    Directory(DirectoryArgs),
    Create(CreateArgs),
    Update(UpdateArgs),
    Submit(RecordArgs),
    Verify(RecordArgs),
    Reject(RejectArgs),
    Delete(RecordArgs),
    Attach(AttachArgs),
    Detail(RecordArgs),
    History(RecordArgs),
    List(ListArgs),
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[arg(long)]
    refs_db: PathBuf,
    #[arg(long)]
    details_db: PathBuf,
    #[arg(long)]
    directory_db: PathBuf,
}

#[derive(Debug, Args)]
struct ActorArgs {
    #[arg(long)]
    actor: String,
    #[arg(long)]
    role: String,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Args)]
struct DirectoryArgs {
    #[command(subcommand)]
    command: DirectorySubcommand,
}

#[derive(Debug, Subcommand)]
enum DirectorySubcommand {
    /// Bind an actor to a student profile, generating the student id when
    /// none is given.
    RegisterStudent {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        student: Option<String>,
    },
    LinkAdvisee {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        advisor: String,
        #[arg(long)]
        student: String,
    },
}

#[derive(Debug, Args)]
struct ContentArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    achievement_type: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long = "tag")]
    tags: Vec<String>,
    #[arg(long, default_value_t = 0)]
    points: u32,
    /// Competition details as a JSON object.
    #[arg(long)]
    details_json: Option<String>,
}

impl ContentArgs {
    fn into_content(self) -> Result<DetailContent> {
        let details: CompetitionDetails = match self.details_json.as_deref() {
            Some(raw) => {
                serde_json::from_str(raw).map_err(|err| anyhow!("invalid details JSON: {err}"))?
            }
            None => CompetitionDetails::default(),
        };
        Ok(DetailContent {
            title: self.title,
            achievement_type: self.achievement_type,
            description: self.description,
            tags: self.tags.into_iter().collect(),
            points: self.points,
            details,
        })
    }
}

#[derive(Debug, Args)]
struct CreateArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[command(flatten)]
    actor: ActorArgs,
    #[command(flatten)]
    content: ContentArgs,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[command(flatten)]
    actor: ActorArgs,
    #[arg(long)]
    id: String,
    #[command(flatten)]
    content: ContentArgs,
}

#[derive(Debug, Args)]
struct RecordArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[command(flatten)]
    actor: ActorArgs,
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
struct RejectArgs {
    #[command(flatten)]
    record: RecordArgs,
    #[arg(long)]
    note: String,
}

#[derive(Debug, Args)]
struct AttachArgs {
    #[command(flatten)]
    record: RecordArgs,
    #[arg(long)]
    file_name: String,
    #[arg(long)]
    file_url: String,
    #[arg(long, default_value = "application/octet-stream")]
    file_type: String,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[command(flatten)]
    actor: ActorArgs,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long, default_value = "newest_first")]
    sort: String,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => init_command(&args),
        Commands::Directory(args) => directory_command(args),
        Commands::Create(args) => create_command(args),
        Commands::Update(args) => update_command(args),
        Commands::Submit(args) => submit_command(&args),
        Commands::Verify(args) => verify_command(&args),
        Commands::Reject(args) => reject_command(&args),
        Commands::Delete(args) => delete_command(&args),
        Commands::Attach(args) => attach_command(args),
        Commands::Detail(args) => detail_command(&args),
        Commands::History(args) => history_command(&args),
        Commands::List(args) => list_command(&args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct Stores {
    references: SqliteReferenceStore,
    details: SqliteDetailStore,
    directory: SqliteProfileDirectory,
}

impl Stores {
    fn open(args: &StoreArgs) -> Result<Self> {
        let references = SqliteReferenceStore::open(&args.refs_db)?;
        references.migrate()?;
        let details = SqliteDetailStore::open(&args.details_db)?;
        details.migrate()?;
        let directory = SqliteProfileDirectory::open(&args.directory_db)?;
        directory.migrate()?;
        Ok(Self {
            references,
            details,
            directory,
        })
    }

    fn coordinator(&self) -> LifecycleCoordinator<'_> {
        LifecycleCoordinator::new(&self.references, &self.details, &self.directory)
    }

    fn projector(&self) -> ListProjector<'_> {
        ListProjector::new(&self.references, &self.details, &self.directory)
    }
}

fn init_command(args: &InitArgs) -> Result<()> {
    Stores::open(&args.store)?;
    println!(
        "initialized refs_db={} details_db={} directory_db={}",
        args.store.refs_db.display(),
        args.store.details_db.display(),
        args.store.directory_db.display()
    );
    Ok(())
}

fn directory_command(args: DirectoryArgs) -> Result<()> {
    match args.command {
        DirectorySubcommand::RegisterStudent {
            store,
            actor,
            student,
        } => {
            let stores = Stores::open(&store)?;
            let actor = ActorId::parse(&actor)?;
            let student = match student.as_deref() {
                Some(value) => StudentId::parse(value)?,
                None => StudentId::new(),
            };
            stores.directory.register_student(actor, student)?;
            println!("actor={actor} student={student}");
        }
        DirectorySubcommand::LinkAdvisee {
            store,
            advisor,
            student,
        } => {
            let stores = Stores::open(&store)?;
            let advisor = ActorId::parse(&advisor)?;
            let student = StudentId::parse(&student)?;
            stores.directory.link_advisee(advisor, student)?;
            println!("advisor={advisor} student={student}");
        }
    }
    Ok(())
}

fn create_command(args: CreateArgs) -> Result<()> {
    let stores = Stores::open(&args.store)?;
    let actor = parse_actor(&args.actor)?;
    let content = args.content.into_content()?;
    let created = stores.coordinator().create(&actor, content)?;
    println!("id={} status={}", created.id, created.status);
    Ok(())
}

fn update_command(args: UpdateArgs) -> Result<()> {
    let stores = Stores::open(&args.store)?;
    let actor = parse_actor(&args.actor)?;
    let id = AchievementId::parse(&args.id)?;
    let content = args.content.into_content()?;
    stores.coordinator().update(&actor, id, content)?;
    println!("id={id} status={}", Status::Draft);
    Ok(())
}

fn submit_command(args: &RecordArgs) -> Result<()> {
    let (stores, actor, id) = open_record(args)?;
    stores.coordinator().submit(&actor, id)?;
    println!("id={id} status={}", Status::Submitted);
    Ok(())
}

fn verify_command(args: &RecordArgs) -> Result<()> {
    let (stores, actor, id) = open_record(args)?;
    stores.coordinator().verify(&actor, id)?;
    println!("id={id} status={}", Status::Verified);
    Ok(())
}

fn reject_command(args: &RejectArgs) -> Result<()> {
    let (stores, actor, id) = open_record(&args.record)?;
    stores.coordinator().reject(&actor, id, &args.note)?;
    println!("id={id} status={}", Status::Rejected);
    Ok(())
}

fn delete_command(args: &RecordArgs) -> Result<()> {
    let (stores, actor, id) = open_record(args)?;
    stores.coordinator().delete(&actor, id)?;
    println!("id={id} status={}", Status::Deleted);
    Ok(())
}

fn attach_command(args: AttachArgs) -> Result<()> {
    let (stores, actor, id) = open_record(&args.record)?;
    let attachment = stores.coordinator().attach(
        &actor,
        id,
        AttachmentInput {
            file_name: args.file_name,
            file_url: args.file_url,
            file_type: args.file_type,
        },
    )?;
    println!("{}", serde_json::to_string(&attachment)?);
    Ok(())
}

fn detail_command(args: &RecordArgs) -> Result<()> {
    let (stores, actor, id) = open_record(args)?;
    let view = stores.coordinator().detail(&actor, id)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn history_command(args: &RecordArgs) -> Result<()> {
    let (stores, actor, id) = open_record(args)?;
    let events = stores.coordinator().history(&actor, id)?;
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn list_command(args: &ListArgs) -> Result<()> {
    let stores = Stores::open(&args.store)?;
    let actor = parse_actor(&args.actor)?;
    let request = ListRequest {
        page: args.page,
        page_size: args.page_size,
        status: args.status.as_deref().map(parse_status).transpose()?,
        sort: parse_sort(&args.sort)?,
    };

    let page = stores.projector().list(&actor, &request)?;
    println!(
        "page={} total_pages={} total_data={} limit={}",
        page.meta.current_page, page.meta.total_pages, page.meta.total_data, page.meta.limit
    );
    for row in page.data {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

fn open_record(args: &RecordArgs) -> Result<(Stores, Actor, AchievementId)> {
    let stores = Stores::open(&args.store)?;
    let actor = parse_actor(&args.actor)?;
    let id = AchievementId::parse(&args.id)?;
    Ok((stores, actor, id))
}

fn parse_actor(args: &ActorArgs) -> Result<Actor> {
    let id = ActorId::parse(&args.actor)?;
    let role = Role::parse(&args.role).ok_or_else(|| {
        anyhow!(
            "invalid role '{}'; use 'student', 'advisor' or 'admin'",
            args.role
        )
    })?;
    Ok(Actor { id, role })
}

fn parse_status(input: &str) -> Result<Status> {
    Status::parse(input).ok_or_else(|| anyhow!("invalid status '{input}'"))
}

fn parse_sort(input: &str) -> Result<SortOrder> {
    SortOrder::parse(input)
        .ok_or_else(|| anyhow!("invalid sort '{input}'; use 'newest_first' or 'oldest_first'"))
}
