//! # fb-extract
//!
//! This crate extracts playable formats and basic metadata from Facebook video
//! pages. Facebook has rendered these pages in several ways over the years, so
//! the embedded video data is located by trying a fixed list of strategies in
//! order, and the title and uploader degrade to defaults instead of failing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fb_extract::{extractor::Extractor, session::Credentials, util};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create HttpClient, a wrapper around reqwest::Client with a shared
//!     // cookie jar and a middleware for retrying transient errors
//!     let client = util::HttpClient::new().unwrap();
//!
//!     // Log in once, if credentials are configured
//!     let extractor = Extractor::new(client, Credentials::from_env().as_ref()).await;
//!
//!     let record = extractor
//!         .extract_video("https://www.facebook.com/video.php?v=637842556329505")
//!         .await
//!         .unwrap();
//!
//!     println!("{} by {:?}", record.title, record.uploader);
//!     for format in &record.formats {
//!         println!("{}: {}", format.format_id, format.url);
//!     }
//! }
//! ```
//!
//! Posts are expanded into their video ids with
//! [`Extractor::extract_post`](extractor::Extractor::extract_post); each id
//! can then be passed to `extract_video`.

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod dash;
pub mod extractor;
pub mod formats;
pub mod metadata;
pub mod post;
pub mod session;
pub mod util;
pub mod video_data;
