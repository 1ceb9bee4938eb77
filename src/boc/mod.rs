//! BOC (Bag Of Cells) implementation.

use crate::cell::{Cell, CellBuilder, CellContext, DynCell, Load, Store};

/// BOC decoder implementation.
pub mod de;
/// BOC encoder implementation.
pub mod ser;

#[cfg(feature = "serde")]
mod serde;

#[cfg(test)]
mod tests;

/// BOC file magic number.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum BocTag {
    /// Single root, cells index, no CRC32.
    Indexed,
    /// Single root, cells index, with CRC32.
    IndexedCrc32,
    /// Multiple roots, optional cells index, optional CRC32.
    #[default]
    Generic,
}

impl BocTag {
    const INDEXED: [u8; 4] = [0x68, 0xff, 0x65, 0xf3];
    const INDEXED_CRC32: [u8; 4] = [0xac, 0xc3, 0xa7, 0x28];
    const GENERIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

    /// Tries to match bytes with BOC tag.
    pub const fn from_bytes(data: [u8; 4]) -> Option<Self> {
        match data {
            Self::GENERIC => Some(Self::Generic),
            Self::INDEXED_CRC32 => Some(Self::IndexedCrc32),
            Self::INDEXED => Some(Self::Indexed),
            _ => None,
        }
    }

    /// Converts BOC tag to bytes.
    pub const fn to_bytes(self) -> [u8; 4] {
        match self {
            Self::Indexed => Self::INDEXED,
            Self::IndexedCrc32 => Self::INDEXED_CRC32,
            Self::Generic => Self::GENERIC,
        }
    }
}

/// BOC (Bag Of Cells) helper.
///
/// Can be used as `#[serde(with = "Boc")]` on `Cell` fields.
pub struct Boc;

impl Boc {
    /// Encodes the specified cell tree as BOC and
    /// returns the `base64` encoded bytes as a string.
    #[cfg(any(feature = "base64", test))]
    pub fn encode_base64<T>(cell: T) -> String
    where
        T: AsRef<DynCell>,
    {
        crate::util::encode_base64(Self::encode(cell))
    }

    /// Encodes the specified cell tree as BOC.
    pub fn encode<T>(cell: T) -> Vec<u8>
    where
        T: AsRef<DynCell>,
    {
        fn encode_impl(cell: &DynCell) -> Vec<u8> {
            let mut result = Vec::new();
            ser::BocHeader::with_root(cell).encode(&mut result);
            result
        }
        encode_impl(cell.as_ref())
    }

    /// Encodes several cell trees into one BOC.
    ///
    /// Roots keep their order. Subtrees shared between roots are stored once.
    pub fn encode_ext<'a, I>(roots: I, with_crc: bool) -> Vec<u8>
    where
        I: IntoIterator<Item = &'a DynCell>,
    {
        let mut header = ser::BocHeader::new();
        for root in roots {
            header.add_root(root);
        }

        let mut result = Vec::new();
        header.with_crc(with_crc).encode(&mut result);
        result
    }

    /// Encodes a pair of cell trees as BOC.
    pub fn encode_pair<T1, T2>((cell1, cell2): (T1, T2)) -> Vec<u8>
    where
        T1: AsRef<DynCell>,
        T2: AsRef<DynCell>,
    {
        Self::encode_ext([cell1.as_ref(), cell2.as_ref()], false)
    }

    /// Decodes a `base64` encoded BOC into a cell tree.
    #[cfg(any(feature = "base64", test))]
    #[inline]
    pub fn decode_base64<T: AsRef<[u8]>>(data: T) -> Result<Cell, de::Error> {
        fn decode_base64_impl(data: &[u8]) -> Result<Cell, de::Error> {
            match crate::util::decode_base64(data) {
                Ok(data) => Boc::decode(data),
                Err(_) => Err(de::Error::UnknownBocTag),
            }
        }
        decode_base64_impl(data.as_ref())
    }

    /// Decodes a cell tree from BOC bytes.
    #[inline]
    pub fn decode<T>(data: T) -> Result<Cell, de::Error>
    where
        T: AsRef<[u8]>,
    {
        Self::decode_ext(data.as_ref(), Cell::empty_context())
    }

    /// Decodes a cell tree from BOC bytes using the specified cell context.
    pub fn decode_ext(data: &[u8], context: &dyn CellContext) -> Result<Cell, de::Error> {
        let header = ok!(de::BocHeader::decode(data, &de::Options::exact(1)));

        let Some(&root) = header.roots().first() else {
            return Err(de::Error::RootCellNotFound);
        };

        let cells = ok!(header.finalize(context));
        let root = match cells.get(root) {
            Some(root) => root,
            None => return Err(de::Error::RootOutOfBounds),
        };

        tracing::debug!(
            cells = header.cells().len(),
            roots = 1,
            size = data.len(),
            "decoded BOC"
        );
        Ok(root)
    }

    /// Decodes a pair of cell trees from BOC bytes.
    pub fn decode_pair<T>(data: T) -> Result<(Cell, Cell), de::Error>
    where
        T: AsRef<[u8]>,
    {
        fn decode_pair_impl(data: &[u8]) -> Result<(Cell, Cell), de::Error> {
            let roots = ok!(Boc::decode_roots(data, &de::Options::exact(2)));
            match <[Cell; 2]>::try_from(roots) {
                Ok([first, second]) => Ok((first, second)),
                Err(_) => Err(de::Error::TooFewRootCells),
            }
        }
        decode_pair_impl(data.as_ref())
    }

    /// Decodes all roots from BOC bytes, in the order they are listed.
    pub fn decode_roots(data: &[u8], options: &de::Options) -> Result<Vec<Cell>, de::Error> {
        let header = ok!(de::BocHeader::decode(data, options));
        let cells = ok!(header.finalize(Cell::empty_context()));

        let mut roots = Vec::with_capacity(header.roots().len());
        for &index in header.roots() {
            match cells.get(index) {
                Some(root) => roots.push(root),
                None => return Err(de::Error::RootOutOfBounds),
            }
        }

        tracing::debug!(
            cells = header.cells().len(),
            roots = roots.len(),
            size = data.len(),
            "decoded BOC"
        );
        Ok(roots)
    }

    /// Serializes cell into an encoded BOC (as base64 for human readable serializers).
    #[cfg(feature = "serde")]
    pub fn serialize<T, S>(cell: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::Serializer,
        T: AsRef<DynCell> + ?Sized,
    {
        use ::serde::Serialize;

        cell.as_ref().serialize(serializer)
    }

    /// Deserializes cell from an encoded BOC (from base64 for human readable deserializers).
    #[cfg(feature = "serde")]
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Cell, D::Error>
    where
        D: ::serde::Deserializer<'de>,
    {
        use ::serde::Deserialize;

        Cell::deserialize(deserializer)
    }
}

/// Helper for serializing and deserializing typed values through BOC.
pub struct BocRepr;

impl BocRepr {
    /// Encodes the specified value into a cell and then into BOC bytes.
    pub fn encode<T>(data: &T) -> Result<Vec<u8>, crate::error::Error>
    where
        T: Store + ?Sized,
    {
        let cell = ok!(CellBuilder::build_from(data));
        Ok(Boc::encode(cell))
    }

    /// Encodes the specified value as a `base64` BOC string.
    #[cfg(any(feature = "base64", test))]
    pub fn encode_base64<T>(data: &T) -> Result<String, crate::error::Error>
    where
        T: Store + ?Sized,
    {
        let cell = ok!(CellBuilder::build_from(data));
        Ok(Boc::encode_base64(cell))
    }

    /// Decodes BOC bytes into a cell and loads the value from it.
    pub fn decode<T, D>(data: D) -> Result<T, BocReprError>
    where
        for<'a> T: Load<'a>,
        D: AsRef<[u8]>,
    {
        let cell = match Boc::decode(data) {
            Ok(cell) => cell,
            Err(e) => return Err(BocReprError::InvalidBoc(e)),
        };

        match cell.as_ref().parse::<T>() {
            Ok(data) => Ok(data),
            Err(e) => Err(BocReprError::InvalidData(e)),
        }
    }

    /// Decodes a `base64` BOC string and loads the value from it.
    #[cfg(any(feature = "base64", test))]
    pub fn decode_base64<T, D>(data: D) -> Result<T, BocReprError>
    where
        for<'a> T: Load<'a>,
        D: AsRef<[u8]>,
    {
        match crate::util::decode_base64(data) {
            Ok(data) => Self::decode(data),
            Err(_) => Err(BocReprError::InvalidBoc(de::Error::UnknownBocTag)),
        }
    }
}

/// Error type for BOC repr decoding related errors.
#[derive(Debug, thiserror::Error)]
pub enum BocReprError {
    /// Failed to decode BOC.
    #[error("invalid BOC")]
    InvalidBoc(#[source] de::Error),
    /// Failed to decode data from cells.
    #[error("failed to decode object from cells")]
    InvalidData(#[source] crate::error::Error),
}
