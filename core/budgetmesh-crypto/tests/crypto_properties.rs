//! Property-based tests for the crypto layer.

use budgetmesh_crypto::{
    decrypt, encrypt, generate_random_key, ChannelCipher, KdfParams, SigningIdentity,
};
use proptest::prelude::*;

fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

fn passphrase_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9!@#$%^&*() ]{1,40}").unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn aead_roundtrip_preserves_data(plaintext in plaintext_strategy()) {
        let key = generate_random_key();
        let encrypted = encrypt(&key, &plaintext).unwrap();
        prop_assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn channel_roundtrip_preserves_data(
        pass in passphrase_strategy(),
        plaintext in plaintext_strategy(),
    ) {
        let c = ChannelCipher::with_params(pass, KdfParams::insecure_fast());
        let frame = c.encrypt(&plaintext).unwrap();
        prop_assert_eq!(c.decrypt(&frame).unwrap(), plaintext);
    }

    #[test]
    fn channel_rejects_other_passphrase(
        a in passphrase_strategy(),
        b in passphrase_strategy(),
        plaintext in plaintext_strategy(),
    ) {
        prop_assume!(a != b);
        let frame = ChannelCipher::with_params(a, KdfParams::insecure_fast())
            .encrypt(&plaintext)
            .unwrap();
        let other = ChannelCipher::with_params(b, KdfParams::insecure_fast());
        prop_assert!(other.decrypt(&frame).is_err());
    }

    #[test]
    fn channel_never_panics_on_garbage(frame in prop::collection::vec(any::<u8>(), 0..256)) {
        let c = ChannelCipher::with_params("p", KdfParams::insecure_fast());
        let _ = c.decrypt(&frame);
    }

    #[test]
    fn signatures_bind_the_message(
        msg in plaintext_strategy(),
        flip in any::<prop::sample::Index>(),
    ) {
        prop_assume!(!msg.is_empty());
        let id = SigningIdentity::generate();
        let sig = id.sign_base64(&msg);
        prop_assert!(id.public_key().verify_base64(&msg, &sig).is_ok());

        let mut tampered = msg.clone();
        let i = flip.index(tampered.len());
        tampered[i] ^= 0x01;
        prop_assert!(id.public_key().verify_base64(&tampered, &sig).is_err());
    }
}
