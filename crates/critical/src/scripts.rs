//! Bootstrap scripts
//!
//! Fixed snippets embedded next to the deferred-styles wrapper. The text is
//! part of the output contract and must stay byte-stable.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use crate::config::ScriptVariant;

/// Scripts the filter can embed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapScript {
    /// Re-activates the `<noscript>` wrapper's stylesheets after `load`
    DeferredStyles,
}

const DEFERRED_STYLES_COMPACT: &str = "(function(){\
var s=document.currentScript,n=s&&s.previousElementSibling,d=false;\
var f=function(){if(d||!n)return;d=true;\
var e=document.createElement(\"div\");e.innerHTML=n.textContent;\
document.body.appendChild(e);};\
if(document.readyState===\"complete\"){f();}else{window.addEventListener(\"load\",f);}\
})();";

const DEFERRED_STYLES_DEBUG: &str = r#"(function() {
  var script = document.currentScript;
  var wrapper = script && script.previousElementSibling;
  var done = false;
  var loadDeferredStyles = function() {
    if (done) {
      return;
    }
    done = true;
    if (!wrapper) {
      console.warn("foldline: deferred styles wrapper not found");
      return;
    }
    var holder = document.createElement("div");
    holder.innerHTML = wrapper.textContent;
    document.body.appendChild(holder);
    console.log("foldline: loaded deferred styles from #" + wrapper.id);
  };
  if (document.readyState === "complete") {
    loadDeferredStyles();
  } else {
    window.addEventListener("load", loadDeferredStyles);
  }
})();"#;

static SCRIPTS: LazyLock<FxHashMap<(BootstrapScript, ScriptVariant), &'static str>> = LazyLock::new(|| {
    let mut scripts = FxHashMap::default();
    scripts.insert(
        (BootstrapScript::DeferredStyles, ScriptVariant::Compact),
        DEFERRED_STYLES_COMPACT,
    );
    scripts.insert((BootstrapScript::DeferredStyles, ScriptVariant::Debug), DEFERRED_STYLES_DEBUG);
    scripts
});

/// Text of a bootstrap script
pub fn bootstrap_script(script: BootstrapScript, variant: ScriptVariant) -> &'static str {
    SCRIPTS.get(&(script, variant)).copied().unwrap_or(DEFERRED_STYLES_COMPACT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_are_stable() {
        let a = bootstrap_script(BootstrapScript::DeferredStyles, ScriptVariant::Compact);
        let b = bootstrap_script(BootstrapScript::DeferredStyles, ScriptVariant::Compact);
        assert!(std::ptr::eq(a, b));
        assert_eq!(a, DEFERRED_STYLES_COMPACT);
    }

    #[test]
    fn test_variants_differ() {
        let compact = bootstrap_script(BootstrapScript::DeferredStyles, ScriptVariant::Compact);
        let debug = bootstrap_script(BootstrapScript::DeferredStyles, ScriptVariant::Debug);
        assert_ne!(compact, debug);
        assert!(debug.contains("console.log"));
        assert!(!compact.contains('\n'));
    }

    #[test]
    fn test_script_cannot_close_its_element() {
        for variant in [ScriptVariant::Compact, ScriptVariant::Debug] {
            let script = bootstrap_script(BootstrapScript::DeferredStyles, variant);
            assert!(!script.to_ascii_lowercase().contains("</script"));
        }
    }
}
