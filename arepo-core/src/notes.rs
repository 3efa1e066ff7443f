// Copyright 2024 The arepo Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Release notes are stored as raw Markdown in the catalog and emitted
// as compressed HTML in the published JSON; the Markdown itself never
// touches disk outside the database. Both the GFM parser and the
// minifier are pluggable behind this trait since their exact output is
// out of scope for this engine.

use arepo_common::Result;
use pulldown_cmark::{html, Options, Parser};

pub trait ReleaseNotesRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String>;
}

pub struct MinifiedCommonmarkRenderer;

impl ReleaseNotesRenderer for MinifiedCommonmarkRenderer {
    fn render(&self, markdown: &str) -> Result<String> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        let parser = Parser::new_ext(markdown, options);

        let mut html_out = String::new();
        html::push_html(&mut html_out, parser);

        let cfg = minify_html::Cfg::new();
        let minified = minify_html::minify(html_out.as_bytes(), &cfg);
        Ok(String::from_utf8_lossy(&minified).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_minifies_basic_markdown() {
        let renderer = MinifiedCommonmarkRenderer;
        let html = renderer.render("# Fixed a bug\n\n- one\n- two\n").unwrap();
        assert!(html.contains("<h1>Fixed a bug</h1>"));
        assert!(html.contains("<li>one</li>"));
        assert!(!html.contains("\n\n"));
    }
}
