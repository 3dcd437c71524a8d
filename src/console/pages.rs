//! Plain-text page bodies.

use std::io::{self, Write};

use serde_json::Value;

use crate::api_client::Resource;
use crate::session::{Admin, AuthState};

pub fn header<W: Write>(out: &mut W, admin: Option<&Admin>) -> io::Result<()> {
    let who = admin
        .map(|a| format!("{} <{}>", a.name, a.email))
        .unwrap_or_default();
    let sections: Vec<&str> = Resource::ALL.iter().map(|r| r.segment()).collect();
    writeln!(out, "== Admin console | {} ==", who)?;
    writeln!(out, "   {} | logout", sections.join(" | "))
}

pub fn home<W: Write>(out: &mut W, admin: Option<&Admin>) -> io::Result<()> {
    let name = admin.map(|a| a.name.as_str()).unwrap_or("admin");
    writeln!(out, "Welcome, {}.", name)?;
    writeln!(out, "Open a section with 'go <section>'.")
}

pub fn login_form<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Sign in: login <email> <password>")
}

pub fn unauthorized<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "You do not have access to this page.")
}

pub fn not_found<W: Write>(out: &mut W, path: &str) -> io::Result<()> {
    writeln!(out, "No page at {}.", path)
}

pub fn collection<W: Write>(out: &mut W, resource: Resource, items: &[Value]) -> io::Result<()> {
    writeln!(out, "{} ({})", resource.label(), items.len())?;
    if items.is_empty() {
        return writeln!(out, "  (none)");
    }
    for item in items {
        writeln!(out, "  - {}", item_title(item))?;
    }
    Ok(())
}

pub fn status<W: Write>(out: &mut W, auth: &AuthState, path: &str) -> io::Result<()> {
    let session = if auth.is_loading {
        "checking".to_string()
    } else {
        match &auth.admin {
            Some(admin) if auth.is_authenticated => {
                let role = admin.role.as_deref().unwrap_or("admin");
                format!("signed in as {} ({})", admin.email, role)
            }
            _ => "signed out".to_string(),
        }
    };
    writeln!(out, "route: {}  session: {}", path, session)
}

pub fn help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  go <path>                  open a route (or just type the section name)")?;
    writeln!(out, "  login <email> <password>   sign in")?;
    writeln!(out, "  logout                     sign out")?;
    writeln!(out, "  reload                     render the current page again")?;
    writeln!(out, "  status                     show route and session")?;
    writeln!(out, "  quit                       leave the console")
}

/// Best human label for a backend record.
pub fn item_title(item: &Value) -> String {
    for field in ["name", "title", "fullName"] {
        if let Some(text) = item.get(field).and_then(Value::as_str) {
            return text.to_string();
        }
    }

    let first = item.get("firstName").and_then(Value::as_str);
    let last = item.get("lastName").and_then(Value::as_str);
    if let (Some(first), Some(last)) = (first, last) {
        return format!("{} {}", first, last);
    }

    match item.get("id").or_else(|| item.get("_id")) {
        Some(Value::String(id)) => format!("#{}", id),
        Some(Value::Number(id)) => format!("#{}", id),
        _ => item.to_string(),
    }
}
