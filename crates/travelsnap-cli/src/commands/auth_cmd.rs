use chrono::{TimeZone, Utc};
use travelsnap_core::auth::IdpCredential;
use travelsnap_core::AuthSession;

use super::common::Context;
use crate::cli::AuthCommands;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let context = Context::open(global_profile)?;
    let auth = &context.backend.auth;
    let profile_name = &context.profile_name;

    match command {
        AuthCommands::Register {
            email,
            password,
            username,
        } => {
            let session = auth.register(&email, &password, &username).await?;
            println!(
                "Registered {} and signed in profile '{profile_name}'",
                email_label(&session)
            );
        }
        AuthCommands::Login { email, password } => {
            let session = auth.login(&email, &password).await?;
            println!(
                "Signed in profile '{profile_name}' as {}",
                email_label(&session)
            );
        }
        AuthCommands::Google { id_token } => {
            let session = auth
                .social_sign_in(&IdpCredential::google(id_token))
                .await?;
            println!(
                "Signed in profile '{profile_name}' as {} with Google",
                email_label(&session)
            );
        }
        AuthCommands::Status => match auth.current_session().await? {
            Some(session) => println!(
                "Profile '{}' is signed in as {} (uid={}, expires_at={})",
                profile_name,
                email_label(&session),
                session.user.id,
                format_expiry(session.expires_at)
            ),
            None => println!("Profile '{profile_name}' is not signed in."),
        },
        AuthCommands::Logout => {
            auth.logout()?;
            println!("Signed out profile '{profile_name}'");
        }
        AuthCommands::ResetPassword { email } => {
            auth.reset_password(&email).await?;
            println!("Password reset email sent to {}", email.trim());
        }
    }

    Ok(())
}

fn email_label(session: &AuthSession) -> &str {
    session.user.email.as_deref().unwrap_or("(no email)")
}

pub fn format_expiry(expires_at: i64) -> String {
    Utc.timestamp_opt(expires_at, 0)
        .single()
        .map_or_else(|| expires_at.to_string(), |at| at.to_rfc3339())
}
