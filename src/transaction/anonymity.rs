//! Anonymity set construction.
//!
//! A transfer is submitted together with a shuffled list of public keys in which
//! the real sender and recipient hide among decoys. The proof service requires the
//! sender and the recipient to sit at positions of opposite parity.

use crate::client::ClientError;
use crate::ledger::PublicKey;
use crate::wallet::FriendDirectory;

use rand::Rng;
use tracing::debug;

/// Shuffled participant list plus the positions of the two real parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymitySet {
    pub participants: Vec<PublicKey>,
    pub self_index: usize,
    pub recipient_index: usize,
}

impl AnonymitySet {
    pub fn size(&self) -> usize {
        self.participants.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Sender,
    Recipient,
    Decoy,
}

/// Nearest powers of two around `size`: `(largest below, smallest above)`.
fn power_of_two_bounds(size: usize) -> (usize, usize) {
    let mut previous = 1;
    let mut next = 2;
    while next < size {
        previous *= 2;
        next *= 2;
    }
    (previous, next)
}

/// An anonymity set must have a power-of-two size of at least two.
pub fn validate_set_size(size: usize) -> Result<(), ClientError> {
    if size >= 2 && size.is_power_of_two() {
        return Ok(());
    }
    let (previous, next) = power_of_two_bounds(size);
    Err(ClientError::InvalidAnonymitySetSize {
        size,
        previous,
        next,
    })
}

/// Builds anonymity sets against a friend directory.
pub struct AnonymitySetBuilder<'a> {
    directory: &'a FriendDirectory,
}

impl<'a> AnonymitySetBuilder<'a> {
    pub fn new(directory: &'a FriendDirectory) -> Self {
        Self { directory }
    }

    fn resolve(&self, name: &str) -> Result<PublicKey, ClientError> {
        self.directory
            .resolve(name)
            .cloned()
            .ok_or_else(|| ClientError::UnknownName(name.to_string()))
    }

    /// Resolve every name, validate the size, shuffle, and repair parity.
    pub fn build<R: Rng + ?Sized>(
        &self,
        self_key: &PublicKey,
        recipient: &str,
        decoys: &[String],
        rng: &mut R,
    ) -> Result<AnonymitySet, ClientError> {
        let mut slots = Vec::with_capacity(decoys.len() + 2);
        slots.push((Role::Sender, self_key.clone()));
        slots.push((Role::Recipient, self.resolve(recipient)?));
        for decoy in decoys {
            slots.push((Role::Decoy, self.resolve(decoy)?));
        }

        validate_set_size(slots.len())?;

        let (self_index, mut recipient_index) = shuffle(&mut slots, rng);

        // the neighbour has the other parity, so it is never the sender's slot
        if self_index % 2 == recipient_index % 2 {
            let partner = recipient_index ^ 1;
            slots.swap(recipient_index, partner);
            recipient_index = partner;
        }

        debug!(
            "Built anonymity set of size {} (sender at {}, recipient at {})",
            slots.len(),
            self_index,
            recipient_index
        );

        Ok(AnonymitySet {
            participants: slots.into_iter().map(|(_, key)| key).collect(),
            self_index,
            recipient_index,
        })
    }
}

/// Fisher–Yates, drawing each final slot from the unshuffled prefix. Returns the
/// final positions of the sender and the recipient.
fn shuffle<R: Rng + ?Sized>(slots: &mut [(Role, PublicKey)], rng: &mut R) -> (usize, usize) {
    let mut self_index = 0;
    let mut recipient_index = 1;
    let mut m = slots.len();
    while m != 0 {
        let i = rng.random_range(0..m);
        m -= 1;
        slots.swap(i, m);
        match slots[m].0 {
            Role::Sender => self_index = m,
            Role::Recipient => recipient_index = m,
            Role::Decoy => {}
        }
    }
    (self_index, recipient_index)
}
