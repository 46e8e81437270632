//! C header generation for the u-boot MES build.
//!
//! Two headers are rendered: `mesh_users.h`, holding the fixed-width user
//! table the bootloader authenticates against, and `default_games.h`, listing
//! the games installed on first boot. Rendering is pure templating; inputs
//! are expected to have passed [`crate::credentials::validate_credentials`]
//! and [`crate::catalog::DefaultCatalog::parse`].

use crate::catalog::DefaultCatalog;
use crate::credentials::{CredentialRecord, MAX_IDENTITY_LEN, SECRET_LEN};
use std::fmt::Write as _;

/// File name of the generated user table header.
pub const MESH_USERS_HEADER: &str = "mesh_users.h";

/// File name of the generated default games header.
pub const DEFAULT_GAMES_HEADER: &str = "default_games.h";

const BANNER: &str = "
/*
* This is an automatically generated file by provision-system
*
*
*/
";

/// Render `mesh_users.h` for the given records, in order.
///
/// # Examples
///
/// ```
/// use mes_provisioner::credentials::CredentialRecord;
/// use mes_provisioner::headers::render_mesh_users;
///
/// let header = render_mesh_users(&[CredentialRecord::demo()]);
/// assert!(header.contains("#define NUM_MESH_USERS 1"));
/// assert!(header.contains(r#"{.username="demo", .pin="00000000"},"#));
/// ```
#[must_use]
pub fn render_mesh_users(users: &[CredentialRecord]) -> String {
    let mut header = format!(
        "{BANNER}
#ifndef __MESH_USERS_H__
#define __MESH_USERS_H__

#define NUM_MESH_USERS {count}

struct MeshUser {{
    char username[{username_width}];
    char pin[{pin_width}];
}};

static struct MeshUser mesh_users[] = {{
",
        count = users.len(),
        username_width = MAX_IDENTITY_LEN + 1,
        pin_width = SECRET_LEN + 1,
    );

    for user in users {
        // Writing to a String cannot fail.
        let _ = writeln!(
            header,
            r#"    {{.username="{}", .pin="{}"}},"#,
            user.identity(),
            user.secret()
        );
    }

    header.push_str(
        "
};

#endif /* __MESH_USERS_H__ */
",
    );
    header
}

/// Render `default_games.h` for a parsed catalogue.
///
/// `NUM_DEFAULT_GAMES` takes the catalogue's declared (raw line) count.
#[must_use]
pub fn render_default_games(catalog: &DefaultCatalog) -> String {
    let mut header = format!(
        "{BANNER}
#ifndef __MESH_DEFAULT_TXT_H__
#define __MESH_DEFAULT_TXT_H__

#define NUM_DEFAULT_GAMES {count}

static char* default_games[] = {{
",
        count = catalog.declared_count(),
    );

    for entry in catalog.entries() {
        let _ = writeln!(header, "    \"{entry}\",");
    }

    header.push_str(
        "
};

#endif /* __MESH_DEFAULT_TXT_H__ */
",
    );
    header
}
