//! Repositories for the shared cache: media, client sessions and the
//! associations between them.

pub mod association;
pub mod client;
pub mod media;

pub use association::AssociationRepository;
pub use client::ClientRepository;
pub use media::MediaRepository;
