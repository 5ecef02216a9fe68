//! MD5 / SHA-1 / SHA-256 / SHA-512 with a uniform `new -> update* -> finish`
//! contract (spec sec. 6.7), backed by the `md-5`/`sha1`/`sha2` crates.

use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

macro_rules! hasher {
    ($name:ident, $inner:ty, $out:expr) => {
        pub struct $name($inner);

        impl $name {
            pub fn new() -> Self { Self(<$inner>::new()) }

            pub fn update(&mut self, data: &[u8]) { Digest::update(&mut self.0, data); }

            pub fn finish(self) -> [u8; $out] {
                let digest = self.0.finalize();
                let mut out = [0u8; $out];
                out.copy_from_slice(&digest);
                out
            }
        }

        impl Default for $name {
            fn default() -> Self { Self::new() }
        }
    };
}

hasher!(Md5Hasher, Md5, 16);
hasher!(Sha1Hasher, Sha1, 20);
hasher!(Sha256Hasher, Sha256, 32);
hasher!(Sha512Hasher, Sha512, 64);

pub fn hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn md5(data: &[u8]) -> [u8; 16]
{
    let mut h = Md5Hasher::new();
    h.update(data);
    h.finish()
}

pub fn sha1(data: &[u8]) -> [u8; 20]
{
    let mut h = Sha1Hasher::new();
    h.update(data);
    h.finish()
}

pub fn sha256(data: &[u8]) -> [u8; 32]
{
    let mut h = Sha256Hasher::new();
    h.update(data);
    h.finish()
}

pub fn sha512(data: &[u8]) -> [u8; 64]
{
    let mut h = Sha512Hasher::new();
    h.update(data);
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_abc()
    {
        assert_eq!(hex(&md5(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hex(&sha1(b"abc")), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex(&sha512(b"abc")),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39\
a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49"
        );
    }
}
