use chrono::Utc;
use travelsnap_core::guard::Route;
use travelsnap_core::models::NewPost;
use travelsnap_core::{PostId, UserId};

use super::common::{
    format_post_lines, format_relative_time, normalize_identifier, parse_location,
    post_to_list_item, read_image, require_own_profile, Context, PostListItem,
};
use crate::cli::PostCommands;
use crate::error::CliError;

pub async fn run_post(command: PostCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let context = Context::open(global_profile)?;

    match command {
        PostCommands::Create {
            description,
            image,
            location,
        } => {
            let geolocation = parse_location(&location)?;
            let (bytes, content_type) = read_image(&image)?;

            let session = context.enter(Route::Composer).await?;
            let profile = require_own_profile(&context, &session).await?;
            let image_url = context
                .backend
                .media
                .upload_post_image(&session, &profile.user_id, bytes, Some(&content_type))
                .await?;
            let post = context
                .backend
                .social
                .create_new_post(
                    &session,
                    &NewPost {
                        author: profile.author_snapshot(),
                        description,
                        image_url,
                        geolocation,
                    },
                )
                .await?;
            println!("Posted {}", post.id);
        }
        PostCommands::Show { post_id, json } => {
            let post_id = PostId::from(normalize_identifier(&post_id, "Post id")?);
            let session = context.enter(Route::Post(post_id.clone())).await?;
            let post = context
                .backend
                .social
                .get_post_by_id(&session, &post_id)
                .await?
                .ok_or_else(|| CliError::NotFound(format!("post {post_id}")))?;
            let now = Utc::now();

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&post_to_list_item(&post, now))?
                );
                return Ok(());
            }

            println!("{}", post.id);
            println!(
                "By {} ({}), {}",
                post.author.username,
                post.author.posted_by,
                format_relative_time(post.created_at, now)
            );
            println!(
                "At {:.5}, {:.5}",
                post.geolocation.lat, post.geolocation.lng
            );
            println!("Likes: {}", post.likes_count);
            println!("Image: {}", post.image_url);
            if !post.description.is_empty() {
                println!();
                println!("{}", post.description);
            }
        }
        PostCommands::List { user, limit, json } => {
            let session = context.enter(Route::Home).await?;
            let social = &context.backend.social;
            let posts = match user {
                Some(user) => {
                    let user_id = UserId::new(normalize_identifier(&user, "User id")?);
                    social
                        .get_posts_by_user(&session, &user_id, Some(limit))
                        .await?
                }
                None => social.get_all_posts(&session, Some(limit)).await?,
            };
            let now = Utc::now();

            if json {
                let items = posts
                    .iter()
                    .map(|post| post_to_list_item(post, now))
                    .collect::<Vec<PostListItem>>();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if posts.is_empty() {
                println!("No posts found.");
            } else {
                for line in format_post_lines(&posts, now) {
                    println!("{line}");
                }
            }
        }
        PostCommands::Like { post_id } => set_liked(&context, &post_id, true).await?,
        PostCommands::Unlike { post_id } => set_liked(&context, &post_id, false).await?,
    }

    Ok(())
}

async fn set_liked(context: &Context, post_id: &str, liked: bool) -> Result<(), CliError> {
    let post_id = PostId::from(normalize_identifier(post_id, "Post id")?);
    let session = context.enter(Route::Post(post_id.clone())).await?;
    let changed = context
        .backend
        .social
        .like_post(&session, &session.user_id(), &post_id, liked)
        .await?;

    match (changed, liked) {
        (true, true) => println!("Liked {post_id}"),
        (true, false) => println!("Unliked {post_id}"),
        (false, true) => println!("Already liked {post_id}"),
        (false, false) => println!("{post_id} was not liked"),
    }
    Ok(())
}
