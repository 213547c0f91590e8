pub mod playlist;
pub mod xtream;

pub use playlist::{Category, Channel, ParsedPlaylist, UNCATEGORIZED, UNKNOWN_NAME};
pub use xtream::{
    XtreamAuthResponse, XtreamCategory, XtreamLiveStream, XtreamServerInfo, XtreamUserInfo,
};
