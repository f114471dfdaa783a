// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Android wallet shell via JNI.
//
// Requires the Android NDK and targets `aarch64-linux-android` or
// `armv7-linux-androideabi`. The Google wallet client performs tokenization
// on the service side, so this backend never produces binding material: it
// launches the push-tokenize activity and reports the finish verdict when
// the host Activity forwards its `onActivityResult` through
// [`handle_push_tokenize_result`]. The host Activity owns that override;
// the Java/Kotlin side only needs to recognise [`REQUEST_PUSH_TOKENIZE`]
// and call through.

#![cfg(target_os = "android")]

use std::sync::{Arc, Mutex, OnceLock};

use jni::objects::{JObject, JString, JValue};
use jni::JNIEnv;

use cardbridge_core::error::{CardBridgeError, Result};
use cardbridge_core::types::{EnrolledCard, FinishVerdict};

use crate::traits::*;

/// Request code for `startIntentSenderForResult`. The host Activity must
/// recognise this in its `onActivityResult` override.
pub const REQUEST_PUSH_TOKENIZE: i32 = 0x5BDE;

/// `Activity.RESULT_OK`.
const RESULT_OK: i32 = -1;
/// `Activity.RESULT_CANCELED`.
const RESULT_CANCELED: i32 = 0;

/// The delegate for the session whose push-tokenize activity is on screen.
/// Populated by `present_enrollment`, taken by the activity-result handler.
static PENDING_DELEGATE: OnceLock<Mutex<Option<Arc<dyn EnrollmentDelegate>>>> = OnceLock::new();

fn pending_delegate() -> &'static Mutex<Option<Arc<dyn EnrollmentDelegate>>> {
    PENDING_DELEGATE.get_or_init(|| Mutex::new(None))
}

// ---------------------------------------------------------------------------
// JNI bootstrap helpers
// ---------------------------------------------------------------------------

/// Obtain a [`JNIEnv`] handle from the global Android context.
fn jni_env() -> Result<JNIEnv<'static>> {
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` returns the `JavaVM*` set by the NDK glue code.
    // The pointer is guaranteed valid for the lifetime of the process.
    let vm = unsafe { jni::JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| CardBridgeError::Bridge(format!("failed to obtain JavaVM: {e}")))?;
    vm.attach_current_thread()
        .map_err(|e| CardBridgeError::Bridge(format!("failed to attach JNI thread: {e}")))
}

/// Obtain the current Android `Activity` as a [`JObject`].
fn activity() -> Result<JObject<'static>> {
    let ctx = ndk_context::android_context();
    let ptr = ctx.context();
    if ptr.is_null() {
        return Err(CardBridgeError::Bridge(
            "Android context is null — native activity not initialised".into(),
        ));
    }
    // SAFETY: the NDK guarantees this pointer is a valid global jobject for
    // the hosting Activity.
    Ok(unsafe { JObject::from_raw(ptr.cast()) })
}

/// Convenience: map any `jni::errors::Error` into `CardBridgeError::Bridge`.
fn jni_err(context: &str, e: jni::errors::Error) -> CardBridgeError {
    CardBridgeError::Bridge(format!("{context}: {e}"))
}

/// Obtain the wallet client for the hosting Activity.
///
/// `TapAndPay.getClient(activity)` on the Java side.
fn wallet_client<'a>(env: &mut JNIEnv<'a>, activity: &JObject) -> Result<JObject<'a>> {
    env.call_static_method(
        "com/google/android/gms/tapandpay/TapAndPay",
        "getClient",
        "(Landroid/app/Activity;)Lcom/google/android/gms/tapandpay/TapAndPayClient;",
        &[JValue::Object(activity)],
    )
    .map_err(|e| jni_err("TapAndPay.getClient", e))?
    .l()
    .map_err(|e| jni_err("TapAndPay.getClient->l", e))
}

/// Block on a `com.google.android.gms.tasks.Task` and return its result.
///
/// Must not be called on the main thread; the caller dispatches probe work
/// off-main before reaching this point.
fn await_task<'a>(env: &mut JNIEnv<'a>, task: &JObject) -> Result<JObject<'a>> {
    env.call_static_method(
        "com/google/android/gms/tasks/Tasks",
        "await",
        "(Lcom/google/android/gms/tasks/Task;)Ljava/lang/Object;",
        &[JValue::Object(task)],
    )
    .map_err(|e| jni_err("Tasks.await", e))?
    .l()
    .map_err(|e| jni_err("Tasks.await->l", e))
}

// ---------------------------------------------------------------------------
// Shell implementation
// ---------------------------------------------------------------------------

/// Android implementation of the wallet shell.
///
/// All methods go through JNI into the wallet client. The struct is
/// zero-sized; all state lives on the Java side plus the pending-delegate
/// slot above.
pub struct AndroidWalletShell;

impl AndroidWalletShell {
    /// Create a new Android shell. Does **not** touch JNI — the first JNI
    /// call happens lazily when a trait method is invoked.
    pub fn new() -> Self {
        Self
    }
}

impl WalletShell for AndroidWalletShell {
    fn platform_name(&self) -> &str {
        "Android"
    }
}

impl WalletProbeShell for AndroidWalletShell {
    fn wallet_available(&self) -> bool {
        // The wallet client class resolving at all is the availability
        // signal; devices without Play services lack it.
        let Ok(mut env) = jni_env() else { return false };
        env.find_class("com/google/android/gms/tapandpay/TapAndPayClient")
            .is_ok()
    }

    fn can_enroll(&self) -> bool {
        let ready = (|| -> Result<bool> {
            let mut env = jni_env()?;
            let activity = activity()?;
            let client = wallet_client(&mut env, &activity)?;
            let task = env
                .call_method(
                    &client,
                    "isReadyToPay",
                    "()Lcom/google/android/gms/tasks/Task;",
                    &[],
                )
                .map_err(|e| jni_err("isReadyToPay", e))?
                .l()
                .map_err(|e| jni_err("isReadyToPay->l", e))?;
            let result = await_task(&mut env, &task)?;
            env.call_method(&result, "booleanValue", "()Z", &[])
                .map_err(|e| jni_err("booleanValue", e))?
                .z()
                .map_err(|e| jni_err("booleanValue->z", e))
        })();

        match ready {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("wallet readiness query failed: {e}");
                false
            }
        }
    }

    fn enrolled_cards(&self) -> Result<Vec<EnrolledCard>> {
        // The wallet client exposes no cross-app token listing without the
        // issuer token id; report an empty snapshot rather than failing the
        // probe.
        Ok(Vec::new())
    }
}

impl EnrollmentShell for AndroidWalletShell {
    fn present_enrollment(
        &self,
        config: &EnrollmentConfig,
        delegate: Arc<dyn EnrollmentDelegate>,
    ) -> Result<()> {
        {
            let mut slot = pending_delegate().lock().expect("delegate lock poisoned");
            if slot.is_some() {
                return Err(CardBridgeError::SessionAlreadyActive);
            }
            *slot = Some(delegate);
        }

        let launch = (|| -> Result<()> {
            let mut env = jni_env()?;
            let activity = activity()?;
            let client = wallet_client(&mut env, &activity)?;

            // PushTokenizeRequest.Builder()
            //     .setCardholderName(...).setPrimaryAccountSuffix(...)
            //     .setLocalizedDescription(...).build()
            let builder = env
                .new_object(
                    "com/google/android/gms/tapandpay/PushTokenizeRequest$Builder",
                    "()V",
                    &[],
                )
                .map_err(|e| jni_err("PushTokenizeRequest.Builder", e))?;

            let set = |env: &mut JNIEnv<'static>, builder: &JObject, method: &str, value: &str| -> Result<()> {
                let j_value: JString = env
                    .new_string(value)
                    .map_err(|e| jni_err("new_string", e))?;
                env.call_method(
                    builder,
                    method,
                    "(Ljava/lang/String;)Lcom/google/android/gms/tapandpay/PushTokenizeRequest$Builder;",
                    &[JValue::Object(&j_value)],
                )
                .map_err(|e| jni_err(method, e))?;
                Ok(())
            };
            set(&mut env, &builder, "setCardholderName", &config.cardholder_name)?;
            set(&mut env, &builder, "setPrimaryAccountSuffix", &config.primary_account_suffix)?;
            set(&mut env, &builder, "setLocalizedDescription", &config.localized_description)?;

            let request = env
                .call_method(
                    &builder,
                    "build",
                    "()Lcom/google/android/gms/tapandpay/PushTokenizeRequest;",
                    &[],
                )
                .map_err(|e| jni_err("PushTokenizeRequest.build", e))?
                .l()
                .map_err(|e| jni_err("build->l", e))?;

            let task = env
                .call_method(
                    &client,
                    "pushTokenize",
                    "(Lcom/google/android/gms/tapandpay/PushTokenizeRequest;)Lcom/google/android/gms/tasks/Task;",
                    &[JValue::Object(&request)],
                )
                .map_err(|e| jni_err("pushTokenize", e))?
                .l()
                .map_err(|e| jni_err("pushTokenize->l", e))?;

            let response = await_task(&mut env, &task)?;

            let pending_intent = env
                .call_method(
                    &response,
                    "getPendingIntent",
                    "()Landroid/app/PendingIntent;",
                    &[],
                )
                .map_err(|e| jni_err("getPendingIntent", e))?
                .l()
                .map_err(|e| jni_err("getPendingIntent->l", e))?;
            if pending_intent.is_null() {
                return Err(CardBridgeError::Configuration(
                    "push tokenize response carried no pending intent".into(),
                ));
            }

            let intent_sender = env
                .call_method(
                    &pending_intent,
                    "getIntentSender",
                    "()Landroid/content/IntentSender;",
                    &[],
                )
                .map_err(|e| jni_err("getIntentSender", e))?
                .l()
                .map_err(|e| jni_err("getIntentSender->l", e))?;

            env.call_method(
                &activity,
                "startIntentSenderForResult",
                "(Landroid/content/IntentSender;ILandroid/content/Intent;III)V",
                &[
                    JValue::Object(&intent_sender),
                    JValue::Int(REQUEST_PUSH_TOKENIZE),
                    JValue::Object(&JObject::null()),
                    JValue::Int(0),
                    JValue::Int(0),
                    JValue::Int(0),
                ],
            )
            .map_err(|e| jni_err("startIntentSenderForResult", e))?;

            tracing::info!("push tokenize activity launched");
            Ok(())
        })();

        if launch.is_err() {
            // The verdict will never arrive; free the slot.
            pending_delegate().lock().expect("delegate lock poisoned").take();
        }
        launch
    }

    fn dismiss_enrollment(&self) {
        // The push-tokenize activity is owned by the wallet service and
        // cannot be dismissed programmatically.
    }
}

/// Forward the host Activity's `onActivityResult` into the engine.
///
/// The host glue must call this for `REQUEST_PUSH_TOKENIZE`; other request
/// codes are ignored and reported as unhandled.
pub fn handle_push_tokenize_result(request_code: i32, result_code: i32) -> bool {
    if request_code != REQUEST_PUSH_TOKENIZE {
        return false;
    }

    let Some(delegate) = pending_delegate()
        .lock()
        .expect("delegate lock poisoned")
        .take()
    else {
        tracing::warn!("push tokenize result arrived with no pending session");
        return true;
    };

    let verdict = match result_code {
        RESULT_OK => FinishVerdict::added(cardbridge_core::types::AddedPassInfo {
            pass_type_identifier: String::new(),
            serial_number: String::new(),
            primary_account_suffix: String::new(),
        }),
        RESULT_CANCELED => FinishVerdict::cancelled(),
        other => FinishVerdict::failed(format!("push tokenize result code {other}")),
    };

    delegate.enrollment_finished(verdict);
    true
}
