use std::io::Write;
use std::path::Path;

use glam::DVec3;

use crate::error::GridError;
use crate::field::DistanceField;

// bumped whenever the encoded layout changes
const FORMAT_VERSION: u32 = 1;

// upper bound of the distances allocated before any of them is read
const MAX_PREALLOCATED_NODES: usize = 1 << 20;

impl bincode::enc::Encode for DistanceField {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&FORMAT_VERSION, encoder)?;
        bincode::Encode::encode(&self.origin().to_array(), encoder)?;
        bincode::Encode::encode(&self.resolution(), encoder)?;
        bincode::Encode::encode(&self.dims(), encoder)?;
        bincode::Encode::encode(&self.distances(), encoder)?;
        Ok(())
    }
}

impl<C> bincode::de::Decode<C> for DistanceField {
    fn decode<D: bincode::de::Decoder<Context = C>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let version: u32 = bincode::Decode::decode(decoder)?;
        if version != FORMAT_VERSION {
            return Err(bincode::error::DecodeError::OtherString(format!(
                "Unsupported grid format version: {version}"
            )));
        }
        let origin: [f64; 3] = bincode::Decode::decode(decoder)?;
        let resolution: f64 = bincode::Decode::decode(decoder)?;
        let dims: [usize; 3] = bincode::Decode::decode(decoder)?;

        let num_nodes = dims
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| {
                let msg = format!("Invalid grid dimensions: {dims:?}");
                bincode::error::DecodeError::OtherString(msg)
            })?;

        // the length prefix of the distances must agree with the dimensions
        let len: u64 = bincode::Decode::decode(decoder)?;
        if len != num_nodes as u64 {
            return Err(bincode::error::DecodeError::OtherString(format!(
                "Expected {num_nodes} distances, found {len}"
            )));
        }

        decoder.claim_container_read::<f32>(num_nodes)?;
        let mut distances = Vec::with_capacity(num_nodes.min(MAX_PREALLOCATED_NODES));
        for _ in 0..num_nodes {
            decoder.unclaim_bytes_read(std::mem::size_of::<f32>());
            distances.push(bincode::Decode::decode(decoder)?);
        }

        DistanceField::from_distances(DVec3::from_array(origin), resolution, dims, distances)
            .map_err(|e| bincode::error::DecodeError::OtherString(format!("Invalid grid: {e}")))
    }
}

impl DistanceField {
    /// Write the field to a file.
    ///
    /// Only the grid geometry and the node distances are stored.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GridError> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        bincode::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        writer.flush()?;
        Ok(())
    }

    /// Read a field written by [`DistanceField::save`].
    ///
    /// The grid is validated again and its interpolation coefficients are recomputed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GridError> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        let field = bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(field)
    }
}
