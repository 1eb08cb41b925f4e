//! Texts delivered to the user's own WhatsApp account once linked.

/// Build the three messages sent after a successful link, in order:
/// the success notice, the session string on its own, and usage
/// instructions.
pub fn delivery_messages(brand: &str, session: &str) -> [String; 3] {
    [
        success_notice(brand),
        session.to_string(),
        instructions(brand),
    ]
}

fn success_notice(brand: &str) -> String {
    format!(
        "✅ *{brand} — Pairing Successful!*\n\n\
         🎉 Your bot has been linked successfully!\n\n\
         Your session string is coming right up 👇\n\n\
         ━━━━━━━━━━━━━━━━━━━━"
    )
}

fn instructions(brand: &str) -> String {
    format!(
        "📋 *How to use your session string:*\n\n\
         1️⃣ Go to your *Pterodactyl Panel*\n\
         2️⃣ Open your bot server\n\
         3️⃣ Go to *Startup* tab\n\
         4️⃣ Find *SESSION_DATA* variable\n\
         5️⃣ Paste the string above\n\
         6️⃣ Click *Start* → Bot is live! 🚀\n\n\
         ━━━━━━━━━━━━━━━━━━━━\n\
         ⚠️ *Keep this string private! Anyone with it can control your bot.*\n\n\
         🤖 *Powered by {brand}*"
    )
}
