//! Embeds git branch/sha/dirty state for `muninn --version`.
//!
//! Outside a git checkout vergen emits placeholder values instead of
//! failing the build, so packaged sources still compile.

use vergen_gitcl::{Emitter, Gitcl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    Emitter::default().add_instructions(&gitcl)?.emit()?;

    Ok(())
}
