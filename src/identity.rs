use rand::Rng;

const CRYPTO_MEME_NAMES: [&str; 30] = [
    "Hodler",
    "DiamondHands",
    "ToTheMoon",
    "Degen",
    "Ape",
    "Whale",
    "Shrimp",
    "Moonboy",
    "Bagholder",
    "Gigachad",
    "Wojak",
    "Pepe",
    "Bobo",
    "Wagmi",
    "Ngmi",
    "Gm",
    "Ser",
    "Anon",
    "Fren",
    "Rekt",
    "Pump",
    "Dump",
    "Shill",
    "Fud",
    "Fomo",
    "Yolo",
    "Lambo",
    "Wen",
    "Cope",
    "Hopium",
];

/// Who this client claims to be. Nothing checks it, collisions are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub user_color: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, user_color: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_color: user_color.into(),
        }
    }

    pub fn random() -> Self {
        Self::random_with(&mut rand::rng())
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let name = CRYPTO_MEME_NAMES[rng.random_range(0..CRYPTO_MEME_NAMES.len())];
        let number = rng.random_range(0..10_000);
        let color = rng.random_range(0..0xFF_FFFF_u32);

        Self {
            username: format!("{name}{number}"),
            user_color: format!("#{color:06x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identity_shape() {
        for _ in 0..100 {
            let Identity { username, user_color } = Identity::random();

            let name = CRYPTO_MEME_NAMES
                .iter()
                .filter(|name| username.starts_with(**name))
                .max_by_key(|name| name.len())
                .unwrap();
            let number: u32 = username[name.len()..].parse().unwrap();
            assert!(number < 10_000);

            assert_eq!(user_color.len(), 7);
            assert!(user_color.starts_with('#'));
            assert!(u32::from_str_radix(&user_color[1..], 16).is_ok());
        }
    }
}
