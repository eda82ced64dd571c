//! Creates the initial admin account. Registration is open, but a fresh
//! deployment needs one Admin before user management is usable.

use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use cmms_backend::auth::password;
use cmms_backend::auth::ROLE_ADMIN;
use cmms_backend::config::AppConfig;
use cmms_backend::db;
use cmms_backend::models::NewUser;
use cmms_backend::schema::users;

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    let (username, secret) = match (args.next(), args.next()) {
        (Some(username), Some(secret)) => (username, secret),
        _ => {
            eprintln!("Usage: bootstrap <username> <password>");
            std::process::exit(1);
        }
    };

    let config = AppConfig::from_env()?;
    let pool = db::init_pool(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let existing: Option<Uuid> = users::table
        .filter(users::username.eq(&username))
        .select(users::id)
        .first(&mut conn)
        .optional()?;
    if existing.is_some() {
        bail!("user '{username}' already exists");
    }

    let admin = NewUser {
        id: Uuid::new_v4(),
        username: username.clone(),
        password_hash: password::hash_password(&secret)?,
        role: ROLE_ADMIN.to_string(),
        first_name: None,
        last_name: None,
    };

    diesel::insert_into(users::table)
        .values(&admin)
        .execute(&mut conn)
        .context("failed to insert admin user")?;

    println!("Created admin user '{username}' ({})", admin.id);
    Ok(())
}
