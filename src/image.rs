use std::fs::File;
use std::io::Read;
use std::path::Path;

use miette::Result;

use crate::error;
use crate::runtime::MEMORY_MAX;

/// A binary program image, as emitted by an LC3 assembler.
///
/// On disk an image is a sequence of 16-bit big-endian words, the first being
/// the address to load the rest at.
pub struct Image {
    origin: u16,
    words: Vec<u16>,
}

impl Image {
    /// Read and validate an image file.
    pub fn open(path: &Path) -> Result<Image> {
        let name = path.display().to_string();
        let mut file = File::open(path).map_err(|e| error::load_io(&name, e))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| error::load_io(&name, e))?;
        Image::parse(&buffer, &name)
    }

    /// Validate a byte stream and convert it to host byte order.
    pub fn parse(bytes: &[u8], name: &str) -> Result<Image> {
        if bytes.len() < 2 {
            return Err(error::load_truncated(name));
        }
        if bytes.len() % 2 != 0 {
            return Err(error::load_unaligned(name, bytes.len()));
        }

        let origin = u16::from_be_bytes([bytes[0], bytes[1]]);
        let words: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]))
            .collect();

        if origin as usize + words.len() > MEMORY_MAX {
            return Err(error::load_too_large(name, origin, words.len()));
        }

        Ok(Image { origin, words })
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }
}
