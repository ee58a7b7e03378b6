pub mod comic_info;
pub mod filename;

pub use comic_info::{parse_comic_info, split_names, ComicInfo};
pub use filename::{parse_filename, FilenameInfo};
