use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, response::Html};
use minijinja::{context, Environment};

use crate::{error::AppResult, survey::SURVEY};

pub type Templates = Arc<Environment<'static>>;

pub fn templates() -> anyhow::Result<Templates> {
    let mut env = Environment::new();
    env.add_template("index.html", include_str!("../../../templates/index.html"))
        .context("index.html template is invalid")?;
    Ok(Arc::new(env))
}

/// # GET /
pub async fn home(State(templates): State<Templates>) -> AppResult<Html<String>> {
    let page = templates
        .get_template("index.html")
        .and_then(|template| template.render(context! { survey => &*SURVEY }))
        .context("Failed to render index.html")?;
    Ok(Html(page))
}
