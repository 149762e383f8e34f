//! Local wallet state: keypairs, per-account balance projections, the session's
//! account book and the friend directory.

mod account;
pub mod address;
mod book;
mod friends;

pub use account::{Account, AccountState, Keypair};
pub use address::{AccountAddress, AddressError};
pub use book::AccountBook;
pub use friends::FriendDirectory;
