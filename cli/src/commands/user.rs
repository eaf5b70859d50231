use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use doze_core::db::Database;

use crate::auth;

/// Create an account with a password so it can log in over the API.
pub(crate) fn cmd_user_add(
    db: &Database,
    username: &str,
    password: &str,
    public: bool,
    json: bool,
) -> Result<()> {
    let username = username.trim();
    if username.len() < 3 {
        bail!("username must be at least 3 characters");
    }
    if password.len() < 6 {
        bail!("password must be at least 6 characters");
    }
    if db.get_user_by_username(username)?.is_some() {
        bail!("username '{username}' is already taken");
    }

    let user = db.create_user(username, &auth::hash_password(password))?;
    if public {
        db.set_user_public(user.id, true)?;
    }

    if json {
        println!(
            "{}",
            serde_json::json!({ "id": user.id, "username": user.username, "is_public": public })
        );
    } else {
        println!("Created user '{}' (id {})", user.username, user.id);
    }
    Ok(())
}

pub(crate) fn cmd_user_list(db: &Database, json: bool) -> Result<()> {
    let users = db.list_users()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Username")]
        username: String,
        #[tabled(rename = "Public")]
        public: &'static str,
        #[tabled(rename = "Created")]
        created: String,
    }

    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            username: u.username.clone(),
            public: if u.is_public { "yes" } else { "no" },
            created: u.created_at.clone(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}
