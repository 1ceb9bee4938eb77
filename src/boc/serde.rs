use std::fmt;

use serde::de::{Error, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Boc;
use crate::cell::{Cell, DynCell};

impl Serialize for DynCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let boc = Boc::encode(self);
        if serializer.is_human_readable() {
            serializer.serialize_str(&crate::util::encode_base64(boc))
        } else {
            serializer.serialize_bytes(&boc)
        }
    }
}

impl Serialize for Cell {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BocVisitor;

        impl<'de> Visitor<'de> for BocVisitor {
            type Value = Cell;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a BOC encoded cell")
            }

            fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
                Boc::decode_base64(v).map_err(Error::custom)
            }

            fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Boc::decode(v).map_err(Error::custom)
            }

            fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Boc::decode(v).map_err(Error::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(BocVisitor)
        } else {
            deserializer.deserialize_bytes(BocVisitor)
        }
    }
}
