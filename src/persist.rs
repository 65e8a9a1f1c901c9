//! JSON documents for [`Network`].

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use crate::{Network, Result};

impl Network {
    /// Encodes the network as a compact JSON document.
    ///
    /// Maps are ordered by key, so encoding the same network always produces the same bytes.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes a network. Cached counts in the metadata are taken from the document as-is.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the network to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);

        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;

        log::info!(
            "saved model `{}` ({} layers) to {}",
            self.metadata.model_id,
            self.metadata.total_layers,
            path.display()
        );
        Ok(())
    }

    /// Reads a network previously written with [`Network::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let net: Self = serde_json::from_reader(reader)?;

        log::info!(
            "loaded model `{}` ({} layers) from {}",
            net.metadata.model_id,
            net.metadata.total_layers,
            path.display()
        );
        Ok(net)
    }
}
