//! Static blocks carry no value; they exist to be placed and rendered.

use tessera_richtext::{Markup, escape};

use crate::block::Block;

#[derive(Clone, Copy, Debug, Default)]
pub struct StaticBlock;

impl StaticBlock {
    /// `admin_text` if set, otherwise a note that there is nothing to edit.
    pub fn render_form(&self, block: &Block) -> Markup {
        if let Some(admin_text) = &block.meta().admin_text {
            return Markup::safe(admin_text.as_str());
        }
        let label = block.label();
        if label.is_empty() {
            Markup::safe("<p>This block has no options.</p>")
        } else {
            Markup::safe(format!(
                "<p>{}: this block has no options.</p>",
                escape(&label)
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::value::Value;
    use serde_json::json;

    #[test]
    fn test_render_form_text() {
        let block = Block::static_block().with_name("posts_static");
        assert_eq!(
            block.render_form(&Value::Null, "", None).as_str(),
            "<p>Posts static: this block has no options.</p>"
        );
        assert_eq!(
            Block::static_block().render_form(&Value::Null, "", None).as_str(),
            "<p>This block has no options.</p>"
        );
        let with_text = Block::static_block().admin_text("Latest <b>posts</b>");
        assert_eq!(
            with_text.render_form(&Value::Null, "", None).as_str(),
            "Latest <b>posts</b>"
        );
    }

    #[test]
    fn test_value_is_always_null() {
        let block = Block::static_block();
        assert_eq!(block.to_python(&json!("anything")), Value::Null);
        assert_eq!(block.get_prep_value(&Value::from("x")), serde_json::Value::Null);
        assert_eq!(block.clean(&Value::from("x")).unwrap(), Value::Null);
        assert!(block.render(&Value::Null, &Context::new()).is_empty());
    }

    #[test]
    fn test_template_renders_without_value() {
        let templates = std::sync::Arc::new(crate::context::TemplateRegistry::new());
        templates.register("posts_static.html", |_args: &crate::context::TemplateArgs<'_>| {
            Markup::safe("<p>PostsStaticBlock template</p>")
        });
        let block = Block::static_block().template("posts_static.html");
        let ctx = Context::new().with_templates(templates);
        assert_eq!(
            block.render(&Value::Null, &ctx).as_str(),
            "<p>PostsStaticBlock template</p>"
        );
    }
}
