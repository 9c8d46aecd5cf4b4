//! Prints an Argon2 PHC hash for a password, for seeding clinic_user
//! rows by hand. Reads the password from argv or, if absent, stdin.

use std::io::Read;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};

fn main() -> anyhow::Result<()> {
    let password = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        anyhow::bail!("usage: hashpass <password>  (or pipe it on stdin)");
    }

    let salt = SaltString::generate(&mut OsRng);
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2: {e}"))?
        .to_string();
    println!("{phc}");
    Ok(())
}
