// Cache key construction.
// Keys are namespaced by record kind; file names append a hash of the raw
// key so distinct keys can never collide after sanitization.

use xxhash_rust::xxh3::xxh3_64;

/// Key for a single repository's metadata.
pub fn repo(owner: &str, repo: &str) -> String {
    format!("repo:{owner}/{repo}")
}

/// Key for the aggregated repository list of a user.
pub fn user_repos(username: &str) -> String {
    format!("user-repos:{username}")
}

/// Key for one page of a user's repository list. Pages carry their own
/// validators so a listing refresh can revalidate page by page.
pub fn user_repos_page(username: &str, page: u32) -> String {
    format!("user-repos:{username}:page{page}")
}

/// Key for a repository's decoded README.
pub fn readme(owner: &str, repo: &str) -> String {
    format!("readme:{owner}/{repo}")
}

/// File name for a key in the durable tier. The sanitized key keeps the
/// file recognizable; the xxh3 digest of the raw key makes it unique.
pub fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}-{:016x}.json", xxh3_64(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(repo("octocat", "hello"), "repo:octocat/hello");
        assert_eq!(user_repos("octocat"), "user-repos:octocat");
        assert_eq!(user_repos_page("octocat", 3), "user-repos:octocat:page3");
        assert_eq!(readme("octocat", "hello"), "readme:octocat/hello");
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let name = file_name("repo:octocat/hello");
        assert!(name.starts_with("repo_octocat_hello-"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_sanitization_collisions_get_distinct_files() {
        // Both sanitize to the same prefix, but the digest differs.
        assert_ne!(file_name("repo:a/b"), file_name("repo:a_b"));
    }

    #[test]
    fn test_file_name_is_stable() {
        assert_eq!(file_name("readme:o/r"), file_name("readme:o/r"));
    }
}
