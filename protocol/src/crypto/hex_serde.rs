//! Serde for fixed-length byte newtypes: hex strings in human-readable
//! formats (JSON), raw bytes in binary ones (bincode).

macro_rules! impl_hex_serde {
    ($ty:ident, $len:expr, $what:literal) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&hex::encode(self.0))
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bytes = if deserializer.is_human_readable() {
                    let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                    hex::decode(s.strip_prefix("0x").unwrap_or(&s))
                        .map_err(serde::de::Error::custom)?
                } else {
                    <Vec<u8> as serde::Deserialize>::deserialize(deserializer)?
                };
                let arr: [u8; $len] = bytes.as_slice().try_into().map_err(|_| {
                    serde::de::Error::custom(format!(
                        "expected {}-byte {}, got {} bytes",
                        $len,
                        $what,
                        bytes.len()
                    ))
                })?;
                Ok($ty(arr))
            }
        }
    };
}

pub(crate) use impl_hex_serde;
