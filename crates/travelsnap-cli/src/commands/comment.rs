use chrono::Utc;
use travelsnap_core::guard::Route;
use travelsnap_core::models::NewComment;
use travelsnap_core::{CommentId, PostId};

use super::common::{
    comment_to_list_item, format_comment_lines, normalize_identifier, require_own_profile,
    Context, CommentListItem,
};
use crate::cli::CommentCommands;
use crate::error::CliError;

pub async fn run_comment(
    command: CommentCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let context = Context::open(global_profile)?;
    let social = &context.backend.social;

    match command {
        CommentCommands::Add { post_id, text } => {
            let post_id = PostId::from(normalize_identifier(&post_id, "Post id")?);
            let text = text.join(" ");
            if text.trim().is_empty() {
                return Err(CliError::InvalidInput(
                    "Comment text cannot be empty".to_string(),
                ));
            }

            let session = context.enter(Route::Post(post_id.clone())).await?;
            let profile = require_own_profile(&context, &session).await?;
            let comment = social
                .add_comment(
                    &session,
                    &post_id,
                    &NewComment {
                        author: profile.author_snapshot(),
                        text,
                    },
                )
                .await?;
            println!("Commented {} on {post_id}", comment.id);
        }
        CommentCommands::List { post_id, json } => {
            let post_id = PostId::from(normalize_identifier(&post_id, "Post id")?);
            let session = context.enter(Route::Post(post_id.clone())).await?;
            let comments = social.get_comments_by_post_id(&session, &post_id).await?;
            let now = Utc::now();

            if json {
                let items = comments
                    .iter()
                    .map(|comment| comment_to_list_item(comment, now))
                    .collect::<Vec<CommentListItem>>();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if comments.is_empty() {
                println!("No comments on {post_id}.");
            } else {
                for line in format_comment_lines(&comments, now) {
                    println!("{line}");
                }
            }
        }
        CommentCommands::Delete {
            post_id,
            comment_id,
        } => {
            let post_id = PostId::from(normalize_identifier(&post_id, "Post id")?);
            let comment_id = CommentId::from(normalize_identifier(&comment_id, "Comment id")?);
            let session = context.enter(Route::Post(post_id.clone())).await?;
            social
                .delete_comment(&session, &post_id, &comment_id)
                .await?;
            println!("Deleted comment {comment_id}");
        }
    }

    Ok(())
}
