//! Video sources and the resolvers behind them.
//!
//! # Module Structure
//!
//! - `resolver` - Resolver traits and the data they exchange
//! - `source` - [`VideoSource`], the restart-to-seek wrapper around one resolver stream
//! - `http` - HTTP(S) URL resolver
//! - `playlist` - HTTP playlist resolver (row ids and M3U)

pub mod http;
pub mod playlist;
pub mod resolver;
pub mod source;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use http::HttpVideoResolver;
pub use playlist::HttpPlaylistResolver;
pub use resolver::{
    is_playlist_reference, ByteRange, ByteStream, PlaylistResolver, ResolveOptions,
    ResolvedStream, ResolverError, ResolverResult, VideoInfo, VideoResolver,
};
pub use source::{BodyStream, VideoDetails, VideoMetadata, VideoSource};
