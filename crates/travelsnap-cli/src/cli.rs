use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "travelsnap")]
#[command(about = "Share geotagged travel photos from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name (backend project and stored session)
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Sign up, sign in and manage the stored session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Show profiles and change your picture
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Publish, browse and like posts
    Post {
        #[command(subcommand)]
        command: PostCommands,
    },
    /// Comment on posts
    Comment {
        #[command(subcommand)]
        command: CommentCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Firebase web config JSON (apiKey, projectId, storageBucket, ...)
        #[arg(long, value_name = "PATH")]
        web_config: Option<PathBuf>,
        /// Web API key
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,
        /// Project id
        #[arg(long, value_name = "ID")]
        project_id: Option<String>,
        /// Storage bucket name
        #[arg(long, value_name = "BUCKET")]
        storage_bucket: Option<String>,
        /// Picture assigned to new profiles
        #[arg(long, value_name = "URL")]
        default_profile_picture: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved profile
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account and profile
    Register {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        /// Display name
        #[arg(long, value_name = "NAME")]
        username: String,
    },
    /// Sign in with email and password
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Sign in with a Google ID token
    Google {
        #[arg(long, value_name = "TOKEN")]
        id_token: String,
    },
    /// Show auth status for the profile
    Status,
    /// Sign out and clear the stored session
    Logout,
    /// Email a password reset link
    ResetPassword {
        #[arg(long, value_name = "EMAIL")]
        email: String,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show a profile (yours by default)
    Show {
        /// User id to show
        #[arg(long, value_name = "UID")]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a new profile picture
    Picture {
        /// Image file
        image: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum PostCommands {
    /// Publish a geotagged image
    Create {
        #[arg(long, value_name = "TEXT")]
        description: String,
        /// Image file
        #[arg(long, value_name = "PATH")]
        image: PathBuf,
        /// Location as "lat,lng"
        #[arg(long, value_name = "LAT,LNG", allow_hyphen_values = true)]
        location: String,
    },
    /// Show one post
    Show {
        post_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the feed or one user's posts
    List {
        /// Only posts by this user id
        #[arg(long, value_name = "UID")]
        user: Option<String>,
        /// Number of posts to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Like a post
    Like { post_id: String },
    /// Remove your like from a post
    Unlike { post_id: String },
}

#[derive(Subcommand)]
pub enum CommentCommands {
    /// Comment on a post
    Add {
        post_id: String,
        /// Comment text
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List comments on a post, oldest first
    List {
        post_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one of your comments
    Delete { post_id: String, comment_id: String },
}
