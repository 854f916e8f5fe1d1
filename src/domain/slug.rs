//! URL-safe aliases for taxonomy nodes.
//!
//! Names are transliterated to ASCII (CJK via `pinyin`) before `slug::slugify`
//! runs, so "基线对齐" becomes `ji-xian-dui-qi`. Uniqueness is checked through a
//! caller-supplied async predicate because slugs only need to be unique inside
//! one forest (taxonomy + group).

use std::future::Future;

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugLookupError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Lookup(E),
}

/// Slugify a node name, or a caller-provided slug.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Find a slug for `input` that `is_free` accepts, suffixing `-2`, `-3`, … on collision.
pub async fn unique_slug<F, Fut, E>(input: &str, mut is_free: F) -> Result<String, SlugLookupError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_free(base.clone()).await.map_err(SlugLookupError::Lookup)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_free(candidate.clone())
            .await
            .map_err(SlugLookupError::Lookup)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugError::Exhausted { base }.into())
}

fn transliterate(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => push_syllable(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            // slugify decides what to keep
            None => output.push(ch),
        }
    }

    output
}

fn push_syllable(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
