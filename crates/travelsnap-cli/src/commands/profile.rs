use travelsnap_core::guard::Route;
use travelsnap_core::UserId;

use super::common::{normalize_identifier, read_image, Context};
use crate::cli::ProfileCommands;
use crate::error::CliError;

pub async fn run_profile(
    command: ProfileCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let context = Context::open(global_profile)?;
    let session = context.enter(Route::Profile).await?;
    let social = &context.backend.social;

    match command {
        ProfileCommands::Show { user, json } => {
            let user_id = match user {
                Some(user) => UserId::new(normalize_identifier(&user, "User id")?),
                None => session.user_id(),
            };
            let profile = social
                .get_user_profile(&session, &user_id)
                .await?
                .ok_or_else(|| CliError::NotFound(format!("profile for user {user_id}")))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
                return Ok(());
            }

            println!("{} ({})", profile.username, profile.user_id);
            if let Some(email) = &profile.email {
                println!("Email: {email}");
            }
            println!("Picture: {}", profile.profile_picture);
            println!("Posts: {}", profile.posts.len());
            println!("Liked posts: {}", profile.liked_posts.len());
        }
        ProfileCommands::Picture { image } => {
            let (bytes, content_type) = read_image(&image)?;
            let user_id = session.user_id();
            let url = context
                .backend
                .media
                .upload_profile_picture(&session, &user_id, bytes, Some(&content_type))
                .await?;
            social
                .update_profile_picture(&session, &user_id, &url)
                .await?;
            println!("Profile picture updated: {url}");
        }
    }

    Ok(())
}
