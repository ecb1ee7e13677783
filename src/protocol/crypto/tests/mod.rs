mod ed25519;
mod x25519;
