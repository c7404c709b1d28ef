pub mod template_selector;
