//! SRP-6a as used by HAP pair-setup (RFC 5054 3072-bit group, SHA-512)

use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use super::{CryptoError, SrpInteger};

/// Public parameters of an SRP group
#[derive(Debug, Clone, Copy)]
pub struct SrpParams {
    /// Safe prime in hex
    pub prime_hex: &'static str,
    /// Generator
    pub generator: u64,
}

impl SrpParams {
    /// RFC 5054 3072-bit group with generator 5, required by HAP
    pub const RFC5054_3072: SrpParams = SrpParams {
        prime_hex: "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08\
                    8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
                    302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9\
                    A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6\
                    49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8\
                    FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D\
                    670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C\
                    180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
                    3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D\
                    04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D\
                    B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226\
                    1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
                    BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC\
                    E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
        generator: 5,
    };
}

/// Size of the private ephemeral exponents in bytes
const EPHEMERAL_SECRET_BYTES: usize = 32;

/// Derived group constants: N, g and the multiplier k
#[derive(Clone)]
pub struct SrpGroup {
    n: SrpInteger,
    g: SrpInteger,
    k: SrpInteger,
}

impl SrpGroup {
    /// Build the group and precompute `k = H(N | PAD(g))`
    ///
    /// # Errors
    ///
    /// Returns an error if the prime is not valid hex.
    pub fn new(params: &SrpParams) -> Result<Self, CryptoError> {
        let n = SrpInteger::from_hex(Some(params.prime_hex))?;
        let g = SrpInteger::from(params.generator);
        let k = hash_integer(&[&n.to_bytes(), &g.to_bytes_padded(n.to_bytes().len())]);
        Ok(Self { n, g, k })
    }

    /// Group prime
    #[must_use]
    pub fn prime(&self) -> &SrpInteger {
        &self.n
    }

    /// Byte length every public value is padded to
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.n.to_bytes().len()
    }

    fn pad(&self, value: &SrpInteger) -> Vec<u8> {
        value.to_bytes_padded(self.byte_len())
    }

    fn public_from_bytes(&self, bytes: &[u8]) -> Result<SrpInteger, CryptoError> {
        let value = SrpInteger::from_bytes(Some(bytes));
        if value.checked_rem(&self.n)?.is_zero() {
            return Err(CryptoError::ZeroPublicValue);
        }
        Ok(value)
    }

    /// u = H(PAD(A) | PAD(B))
    fn scrambler(&self, a_pub: &SrpInteger, b_pub: &SrpInteger) -> SrpInteger {
        hash_integer(&[&self.pad(a_pub), &self.pad(b_pub)])
    }

    /// M1 = H(H(N) xor H(g) | H(I) | s | A | B | K)
    fn client_proof(
        &self,
        identity: &[u8],
        salt: &[u8],
        a_pub: &SrpInteger,
        b_pub: &SrpInteger,
        key: &[u8],
    ) -> Vec<u8> {
        let hn = Sha512::digest(self.n.to_bytes());
        let hg = Sha512::digest(self.g.to_bytes());
        let hn_xor_hg: Vec<u8> = hn.iter().zip(hg.iter()).map(|(a, b)| a ^ b).collect();

        let mut hasher = Sha512::new();
        hasher.update(&hn_xor_hg);
        hasher.update(Sha512::digest(identity));
        hasher.update(salt);
        hasher.update(self.pad(a_pub));
        hasher.update(self.pad(b_pub));
        hasher.update(key);
        hasher.finalize().to_vec()
    }

    /// M2 = H(A | M1 | K)
    fn server_proof(&self, a_pub: &SrpInteger, m1: &[u8], key: &[u8]) -> Vec<u8> {
        let mut hasher = Sha512::new();
        hasher.update(self.pad(a_pub));
        hasher.update(m1);
        hasher.update(key);
        hasher.finalize().to_vec()
    }

    fn session_key(&self, premaster: &SrpInteger) -> Vec<u8> {
        Sha512::digest(self.pad(premaster)).to_vec()
    }
}

fn hash_integer(parts: &[&[u8]]) -> SrpInteger {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    SrpInteger::from_bytes(Some(&hasher.finalize()))
}

/// x = H(s | H(I | ":" | P))
#[must_use]
pub fn derive_private_key(identity: &[u8], password: &[u8], salt: &[u8]) -> SrpInteger {
    let mut inner = Sha512::new();
    inner.update(identity);
    inner.update(b":");
    inner.update(password);
    let inner = inner.finalize();

    hash_integer(&[salt, &inner])
}

/// SRP client session (the controller side of pair-setup)
pub struct SrpClient {
    group: SrpGroup,
    a: SrpInteger,
    a_pub: SrpInteger,
    public_key: Vec<u8>,
}

impl SrpClient {
    /// Start a session with a fresh random exponent
    ///
    /// # Errors
    ///
    /// Returns an error if the group parameters are invalid.
    pub fn new(params: &SrpParams) -> Result<Self, CryptoError> {
        Self::with_secret(params, SrpInteger::random(EPHEMERAL_SECRET_BYTES)?)
    }

    /// Start a session with a caller-supplied exponent
    ///
    /// # Errors
    ///
    /// Returns an error if the group parameters are invalid.
    pub fn with_secret(params: &SrpParams, a: SrpInteger) -> Result<Self, CryptoError> {
        let group = SrpGroup::new(params)?;
        let a_pub = group.g.mod_pow(&a, &group.n)?;
        let public_key = group.pad(&a_pub);
        Ok(Self {
            group,
            a,
            a_pub,
            public_key,
        })
    }

    /// A, padded to the group length
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// S = (B - k * g^x) ^ (a + u * x) mod N
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ZeroPublicValue` if B is congruent to zero.
    pub fn compute_premaster(
        &self,
        identity: &[u8],
        password: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpInteger, CryptoError> {
        let b_pub = self.group.public_from_bytes(server_public)?;
        let n = &self.group.n;

        let u = self.group.scrambler(&self.a_pub, &b_pub);
        let x = derive_private_key(identity, password, salt);

        let g_x = self.group.g.mod_pow(&x, n)?;
        let base = (&b_pub - &(&self.group.k * &g_x)).checked_rem(n)?;
        let exponent = &self.a + &(&u * &x);
        base.mod_pow(&exponent, n)
    }

    /// Process the server challenge (salt, B) and compute the client proof
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ZeroPublicValue` if B is congruent to zero.
    pub fn process_challenge(
        &self,
        identity: &[u8],
        password: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpVerifier, CryptoError> {
        let premaster = self.compute_premaster(identity, password, salt, server_public)?;
        let key = self.group.session_key(&premaster);

        let b_pub = SrpInteger::from_bytes(Some(server_public));
        let m1 = self
            .group
            .client_proof(identity, salt, &self.a_pub, &b_pub, &key);
        let expected_m2 = self.group.server_proof(&self.a_pub, &m1, &key);

        Ok(SrpVerifier {
            m1,
            expected_m2,
            key,
        })
    }
}

/// Client state after the challenge, waiting for the server proof
pub struct SrpVerifier {
    m1: Vec<u8>,
    expected_m2: Vec<u8>,
    key: Vec<u8>,
}

impl SrpVerifier {
    /// M1, sent to the accessory
    #[must_use]
    pub fn client_proof(&self) -> &[u8] {
        &self.m1
    }

    /// Check M2 and release the session key
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SrpError` if the server proof does not match.
    pub fn verify_server(&self, server_proof: &[u8]) -> Result<SessionKey, CryptoError> {
        if self.expected_m2.as_slice() != server_proof {
            return Err(CryptoError::SrpError(
                "server proof verification failed".to_string(),
            ));
        }

        Ok(SessionKey {
            key: self.key.clone(),
        })
    }
}

impl Drop for SrpVerifier {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// SRP server session. Used by the mock accessory and by tests.
pub struct SrpServer {
    group: SrpGroup,
    v: SrpInteger,
    b: SrpInteger,
    b_pub: SrpInteger,
    public_key: Vec<u8>,
}

impl SrpServer {
    /// v = g^x mod N, padded to the group length
    ///
    /// # Errors
    ///
    /// Returns an error if the group parameters are invalid.
    pub fn compute_verifier(
        identity: &[u8],
        password: &[u8],
        salt: &[u8],
        params: &SrpParams,
    ) -> Result<Vec<u8>, CryptoError> {
        let group = SrpGroup::new(params)?;
        let x = derive_private_key(identity, password, salt);
        let v = group.g.mod_pow(&x, &group.n)?;
        Ok(group.pad(&v))
    }

    /// Start a session for a stored verifier with a fresh random exponent
    ///
    /// # Errors
    ///
    /// Returns an error if the group parameters are invalid.
    pub fn new(verifier: &[u8], params: &SrpParams) -> Result<Self, CryptoError> {
        Self::with_secret(
            verifier,
            params,
            SrpInteger::random(EPHEMERAL_SECRET_BYTES)?,
        )
    }

    /// Start a session with a caller-supplied exponent
    ///
    /// B = (k * v + g^b) mod N
    ///
    /// # Errors
    ///
    /// Returns an error if the group parameters are invalid.
    pub fn with_secret(
        verifier: &[u8],
        params: &SrpParams,
        b: SrpInteger,
    ) -> Result<Self, CryptoError> {
        let group = SrpGroup::new(params)?;
        let v = SrpInteger::from_bytes(Some(verifier));
        let g_b = group.g.mod_pow(&b, &group.n)?;
        let b_pub = (&(&group.k * &v) + &g_b).checked_rem(&group.n)?;
        let public_key = group.pad(&b_pub);
        Ok(Self {
            group,
            v,
            b,
            b_pub,
            public_key,
        })
    }

    /// B, padded to the group length
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// S = (A * v^u) ^ b mod N
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ZeroPublicValue` if A is congruent to zero.
    pub fn compute_premaster(&self, client_public: &[u8]) -> Result<SrpInteger, CryptoError> {
        let a_pub = self.group.public_from_bytes(client_public)?;
        let n = &self.group.n;

        let u = self.group.scrambler(&a_pub, &self.b_pub);
        let v_u = self.v.mod_pow(&u, n)?;
        let base = (&a_pub * &v_u).checked_rem(n)?;
        base.mod_pow(&self.b, n)
    }

    /// Check M1 and produce (K, M2)
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ZeroPublicValue` for a degenerate A and
    /// `CryptoError::SrpError` when the client proof does not match.
    pub fn verify_client(
        &self,
        identity: &[u8],
        salt: &[u8],
        client_public: &[u8],
        client_proof: &[u8],
    ) -> Result<(SessionKey, Vec<u8>), CryptoError> {
        let premaster = self.compute_premaster(client_public)?;
        let key = self.group.session_key(&premaster);

        let a_pub = SrpInteger::from_bytes(Some(client_public));
        let expected_m1 = self
            .group
            .client_proof(identity, salt, &a_pub, &self.b_pub, &key);
        if expected_m1.as_slice() != client_proof {
            return Err(CryptoError::SrpError(
                "client proof verification failed".to_string(),
            ));
        }

        let m2 = self.group.server_proof(&a_pub, client_proof, &key);
        Ok((SessionKey { key }, m2))
    }
}

/// Shared session key K
pub struct SessionKey {
    key: Vec<u8>,
}

impl SessionKey {
    /// Key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
