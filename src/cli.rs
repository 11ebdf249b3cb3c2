//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use bookshelf_core::OrganizationMode;

/// Resolve book metadata and organize ebook files into a library.
///
/// Bookshelf reads embedded metadata and filenames, confirms them against
/// Google Books and Open Library, and files each book under
/// `<DEST>/<Author>/` with a canonical name.
#[derive(Parser, Debug)]
#[command(name = "bookshelf")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/bookshelf/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Organize every book under SRC into the library at DEST
    Organize(OrganizeArgs),

    /// List unlocated files awaiting correction
    Unlocated {
        /// Library folder
        dest: PathBuf,
    },

    /// Supply metadata for an unlocated file and re-process it
    Correct(CorrectArgs),

    /// Move an unlocated file to the excluded area
    Exclude {
        /// Library folder
        dest: PathBuf,
        /// Record id shown by `bookshelf unlocated`
        id: i64,
    },

    /// Probe both metadata sources and report availability
    CheckApis {
        /// Google Books API key
        #[arg(long, env = "GOOGLE_BOOKS_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Manage the lookup cache of a library
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(ClapArgs, Debug)]
pub struct OrganizeArgs {
    /// Folder holding the books to organize
    pub src: PathBuf,

    /// Library folder
    pub dest: PathBuf,

    /// Folder layout: author or genre-author
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<OrganizationMode>,

    /// Naming pattern using {title}, {author} and {year}
    #[arg(long)]
    pub pattern: Option<String>,

    /// Plan cover image paths for resolved books
    #[arg(long)]
    pub covers: bool,

    /// Google Books API key
    #[arg(long, env = "GOOGLE_BOOKS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Strip diacritics and fix capitalization of titles and authors
    #[arg(long)]
    pub normalize: bool,

    /// Maximum files processed at once (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Per-request timeout for metadata sources in seconds (1-300)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub timeout: Option<u64>,

    /// Plan and record without moving files
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct CorrectArgs {
    /// Library folder
    pub dest: PathBuf,

    /// Record id shown by `bookshelf unlocated`
    pub id: i64,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub author: String,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long)]
    pub genre: Option<String>,

    #[arg(long)]
    pub isbn: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Forget the cached answer for one book
    Invalidate {
        /// Library folder
        dest: PathBuf,
        #[arg(long, conflicts_with = "title", required_unless_present = "title")]
        isbn: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, requires = "title")]
        author: Option<String>,
    },

    /// Forget every cached answer
    Clear {
        /// Library folder
        dest: PathBuf,
    },
}

fn parse_mode(value: &str) -> Result<OrganizationMode, String> {
    value.parse()
}
