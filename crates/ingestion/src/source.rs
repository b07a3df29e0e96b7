//! Block sources.
//!
//! A source yields raw blocks in strictly increasing height order. The
//! pipeline verifies the ordering; sources only promise it.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use oracle_core::{Error, Height, RawBlock, Result};
use tracing::debug;

/// Supplies raw blocks one at a time.
pub trait BlockSource: Send {
    /// Next block, or `None` once the source is exhausted.
    ///
    /// An `Err` means the source itself failed and the run must stop.
    fn next_block(&mut self) -> Result<Option<RawBlock>>;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn next_block(&mut self) -> Result<Option<RawBlock>> {
        (**self).next_block()
    }
}

impl<S: BlockSource + ?Sized> BlockSource for &mut S {
    fn next_block(&mut self) -> Result<Option<RawBlock>> {
        (**self).next_block()
    }
}

/// Blocks held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    blocks: VecDeque<RawBlock>,
}

impl MemorySource {
    pub fn new(blocks: impl IntoIterator<Item = RawBlock>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
        }
    }

    pub fn push(&mut self, block: RawBlock) {
        self.blocks.push_back(block);
    }

    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

impl BlockSource for MemorySource {
    fn next_block(&mut self) -> Result<Option<RawBlock>> {
        Ok(self.blocks.pop_front())
    }
}

/// On-disk encoding of a block file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFileFormat {
    /// `<height>.hex`: hex text, surrounding whitespace ignored.
    Hex,
    /// `<height>.bin`: raw bytes.
    Binary,
}

impl BlockFileFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "hex" => Some(Self::Hex),
            "bin" => Some(Self::Binary),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Binary => "bin",
        }
    }
}

#[derive(Debug, Clone)]
struct BlockFile {
    height: Height,
    path: PathBuf,
    format: BlockFileFormat,
}

/// Blocks persisted one per file in a directory, named by height.
///
/// Files whose stem is not a height or whose extension is unknown are ignored.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    files: VecDeque<BlockFile>,
}

impl DirectorySource {
    /// Index the block files in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::source(format!("cannot read {}: {e}", dir.display())))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let format = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(BlockFileFormat::from_extension);
            let height = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Height>().ok());
            if let (Some(format), Some(height)) = (format, height) {
                files.push(BlockFile {
                    height,
                    path,
                    format,
                });
            }
        }

        files.sort_by_key(|f| f.height);
        if let Some(pair) = files.windows(2).find(|w| w[0].height == w[1].height) {
            return Err(Error::source(format!(
                "duplicate block files for height {}: {} and {}",
                pair[0].height,
                pair[0].path.display(),
                pair[1].path.display()
            )));
        }

        debug!(dir = %dir.display(), blocks = files.len(), "indexed block directory");
        Ok(Self {
            dir,
            files: files.into(),
        })
    }

    /// Skip every block below `height`.
    pub fn starting_at(mut self, height: Height) -> Self {
        while self.files.front().is_some_and(|f| f.height < height) {
            self.files.pop_front();
        }
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Heights not yet yielded.
    pub fn heights(&self) -> impl Iterator<Item = Height> + '_ {
        self.files.iter().map(|f| f.height)
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }

    /// Persist a block in `dir` in the given format.
    pub fn write_block(
        dir: impl AsRef<Path>,
        block: &RawBlock,
        format: BlockFileFormat,
    ) -> Result<PathBuf> {
        let path = dir
            .as_ref()
            .join(format!("{}.{}", block.height, format.extension()));
        match format {
            BlockFileFormat::Hex => std::fs::write(&path, hex::encode(&block.payload))?,
            BlockFileFormat::Binary => std::fs::write(&path, &block.payload)?,
        }
        Ok(path)
    }
}

impl BlockSource for DirectorySource {
    fn next_block(&mut self) -> Result<Option<RawBlock>> {
        let Some(file) = self.files.pop_front() else {
            return Ok(None);
        };

        let bytes = std::fs::read(&file.path)
            .map_err(|e| Error::source(format!("cannot read {}: {e}", file.path.display())))?;
        let payload = match file.format {
            BlockFileFormat::Binary => bytes,
            BlockFileFormat::Hex => {
                let text = String::from_utf8_lossy(&bytes);
                hex::decode(text.trim()).map_err(|e| {
                    Error::source(format!("invalid hex in {}: {e}", file.path.display()))
                })?
            }
        };

        Ok(Some(RawBlock::new(file.height, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut impl BlockSource) -> Vec<RawBlock> {
        let mut out = Vec::new();
        while let Some(block) = source.next_block().unwrap() {
            out.push(block);
        }
        out
    }

    #[test]
    fn test_memory_source_in_order() {
        let mut source = MemorySource::new(vec![
            RawBlock::new(1, vec![1]),
            RawBlock::new(2, vec![2]),
        ]);
        source.push(RawBlock::new(3, vec![3]));
        let heights: Vec<_> = drain(&mut source).iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert!(source.next_block().unwrap().is_none());
    }

    #[test]
    fn test_boxed_source() {
        let mut source: Box<dyn BlockSource> =
            Box::new(MemorySource::new(vec![RawBlock::new(9, vec![])]));
        assert_eq!(source.next_block().unwrap().unwrap().height, 9);
        assert!(source.next_block().unwrap().is_none());
    }

    #[test]
    fn test_directory_source_sorts_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for (height, format) in [
            (100, BlockFileFormat::Hex),
            (9, BlockFileFormat::Binary),
            (20, BlockFileFormat::Hex),
        ] {
            let block = RawBlock::new(height, vec![height as u8, 0xAB]);
            DirectorySource::write_block(dir.path(), &block, format).unwrap();
        }
        std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("tip.hex"), "00").unwrap();

        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.heights().collect::<Vec<_>>(), vec![9, 20, 100]);

        let blocks = drain(&mut source);
        assert_eq!(blocks[0], RawBlock::new(9, vec![9, 0xAB]));
        assert_eq!(blocks[2], RawBlock::new(100, vec![100, 0xAB]));
    }

    #[test]
    fn test_directory_source_starting_at() {
        let dir = tempfile::tempdir().unwrap();
        for height in 1..=5 {
            let block = RawBlock::new(height, vec![0]);
            DirectorySource::write_block(dir.path(), &block, BlockFileFormat::Hex).unwrap();
        }
        let source = DirectorySource::open(dir.path()).unwrap().starting_at(3);
        assert_eq!(source.heights().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_hex_whitespace_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7.hex"), "  deadbeef\n").unwrap();
        let mut source = DirectorySource::open(dir.path()).unwrap();
        let block = source.next_block().unwrap().unwrap();
        assert_eq!(block.payload, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_duplicate_height_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let block = RawBlock::new(5, vec![1]);
        DirectorySource::write_block(dir.path(), &block, BlockFileFormat::Hex).unwrap();
        DirectorySource::write_block(dir.path(), &block, BlockFileFormat::Binary).unwrap();
        assert!(matches!(
            DirectorySource::open(dir.path()),
            Err(Error::Source(_))
        ));
    }

    #[test]
    fn test_invalid_hex_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.hex"), "zz").unwrap();
        let mut source = DirectorySource::open(dir.path()).unwrap();
        let err = source.next_block().unwrap_err();
        assert!(!err.is_block_local());
    }

    #[test]
    fn test_missing_directory() {
        assert!(DirectorySource::open("/nonexistent/utxo-oracle-blocks").is_err());
    }
}
