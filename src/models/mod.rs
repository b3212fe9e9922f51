pub mod models;

pub use models::{AuthUser, EditRequest, FeedItem, FollowState, ImageChange, Post, PostEdit, Reply, ReplyEdit, UserProfile};
