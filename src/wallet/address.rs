use bech32::{Bech32m, Hrp};
use thiserror::Error;

use crate::ledger::{Point, PublicKey};

/// Width of one encoded curve coordinate.
const COORDINATE_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum AddressError {
	#[error("prefix first part != 'zsc'")]
	PrefixInvalidConstant,
	#[error("bech32 error: {0}")]
	Bech32(String),
	#[error("payload must be {expected} bytes, got {actual}")]
	InvalidLength { expected: usize, actual: usize },
	#[error("coordinate is not valid hex: {0}")]
	InvalidCoordinate(String),
}

/// Shareable bech32m form of an account public key: `zsc[_network]1...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAddress {
	pub network: Option<String>,
	pub public_key: PublicKey,
}

impl AccountAddress {
	pub fn new(public_key: PublicKey, network: Option<String>) -> Self {
		Self {
			network,
			public_key,
		}
	}

	pub fn decode(encoded_data: &str) -> Result<Self, AddressError> {
		let (hrp, data) =
			bech32::decode(encoded_data).map_err(|e| AddressError::Bech32(e.to_string()))?;
		let prefix_parts = hrp.as_str().split('_').collect::<Vec<&str>>();
		prefix_parts
			.first()
			.filter(|c| *c == &"zsc")
			.ok_or(AddressError::PrefixInvalidConstant)?;
		let network = prefix_parts.get(1).map(|s| s.to_string());

		if data.len() != 2 * COORDINATE_BYTES {
			return Err(AddressError::InvalidLength {
				expected: 2 * COORDINATE_BYTES,
				actual: data.len(),
			});
		}
		let (x, y) = data.split_at(COORDINATE_BYTES);

		Ok(Self {
			network,
			public_key: Point::new(format!("0x{}", hex::encode(x)), format!("0x{}", hex::encode(y))),
		})
	}

	pub fn encode(&self) -> Result<String, AddressError> {
		let network_str = match &self.network {
			Some(network) => format!("_{}", network),
			None => "".to_string(),
		};

		let mut data = coordinate_bytes(&self.public_key.0)?;
		data.extend(coordinate_bytes(&self.public_key.1)?);

		let hrp = Hrp::parse(&format!("zsc{}", network_str))
			.map_err(|e| AddressError::Bech32(e.to_string()))?;
		bech32::encode::<Bech32m>(hrp, &data).map_err(|e| AddressError::Bech32(e.to_string()))
	}
}

/// Decode a `0x`-prefixed coordinate into a left-padded 32 byte big-endian value.
fn coordinate_bytes(coordinate: &str) -> Result<Vec<u8>, AddressError> {
	let digits = coordinate.strip_prefix("0x").unwrap_or(coordinate);
	let digits = if digits.len() % 2 == 1 {
		format!("0{}", digits)
	} else {
		digits.to_string()
	};
	let bytes =
		hex::decode(&digits).map_err(|_| AddressError::InvalidCoordinate(coordinate.to_string()))?;
	if bytes.len() > COORDINATE_BYTES {
		return Err(AddressError::InvalidLength {
			expected: COORDINATE_BYTES,
			actual: bytes.len(),
		});
	}
	let mut padded = vec![0u8; COORDINATE_BYTES - bytes.len()];
	padded.extend(bytes);
	Ok(padded)
}
